//! Adapter, queue-family and memory-type selection.
//!
//! Everything here works on plain descriptors pulled out of a backend
//! enumeration, so the policy can be exercised without a driver.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::backend::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AdapterKind {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

impl AdapterKind {
    pub fn label(self) -> &'static str {
        match self {
            AdapterKind::Discrete => "DiscreteGPU",
            AdapterKind::Integrated => "IntegratedGPU",
            AdapterKind::Virtual => "VirtualGPU",
            AdapterKind::Cpu => "CPU",
            AdapterKind::Other => "Other",
        }
    }
}

/// A physical adapter as reported by one enumeration call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdapterInfo {
    pub id: Handle,
    pub kind: AdapterKind,
    pub name: String,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QueueCaps: u32 {
        const GRAPHICS = 0b0001;
        const COMPUTE = 0b0010;
        const TRANSFER = 0b0100;
        const SPARSE_BINDING = 0b1000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryFlags: u32 {
        const DEVICE_LOCAL = 0b00001;
        const HOST_VISIBLE = 0b00010;
        const HOST_COHERENT = 0b00100;
        const HOST_CACHED = 0b01000;
        const LAZILY_ALLOCATED = 0b10000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    pub index: u32,
    pub caps: QueueCaps,
    pub queue_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryTypeInfo {
    pub index: u32,
    pub flags: MemoryFlags,
    pub heap_index: u32,
    /// Byte size of the owning heap.
    pub heap_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryChoice {
    pub index: u32,
    pub heap_size: u64,
}

/// How repeated matches in a queue-family scan are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueFamilyPolicy {
    /// Keep overwriting the captured index; the last capable family wins.
    #[default]
    LastMatch,
    /// Stop at the first capable family.
    FirstMatch,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueFamilySelection {
    pub compute: Option<u32>,
    pub transfer: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueRequest {
    pub family_index: u32,
    pub queue_count: u32,
    pub priority: f32,
}

impl QueueRequest {
    pub fn single(family_index: u32) -> Self {
        Self { family_index, queue_count: 1, priority: 1.0 }
    }
}

/// First discrete adapter, otherwise first integrated one.
pub fn select_adapter(adapters: &[AdapterInfo]) -> Option<&AdapterInfo> {
    adapters
        .iter()
        .find(|a| a.kind == AdapterKind::Discrete)
        .or_else(|| adapters.iter().find(|a| a.kind == AdapterKind::Integrated))
}

fn scan_family(families: &[QueueFamilyInfo], cap: QueueCaps, policy: QueueFamilyPolicy) -> Option<u32> {
    let mut matches = families.iter().filter(|f| f.caps.contains(cap)).map(|f| f.index);
    match policy {
        QueueFamilyPolicy::LastMatch => matches.last(),
        QueueFamilyPolicy::FirstMatch => matches.next(),
    }
}

pub fn select_queue_families(families: &[QueueFamilyInfo], policy: QueueFamilyPolicy) -> QueueFamilySelection {
    QueueFamilySelection {
        compute: scan_family(families, QueueCaps::COMPUTE, policy),
        transfer: scan_family(families, QueueCaps::TRANSFER, policy),
    }
}

/// First memory type whose flags cover `required`, with its heap budget.
pub fn select_memory_type(types: &[MemoryTypeInfo], required: MemoryFlags) -> Option<MemoryChoice> {
    types
        .iter()
        .find(|t| t.flags.contains(required))
        .map(|t| MemoryChoice { index: t.index, heap_size: t.heap_size })
}

/// One request when both roles share a family, two otherwise.
pub fn queue_requests(compute_family: u32, transfer_family: u32) -> Vec<QueueRequest> {
    if compute_family == transfer_family {
        vec![QueueRequest::single(compute_family)]
    } else {
        vec![QueueRequest::single(compute_family), QueueRequest::single(transfer_family)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(id: u64, kind: AdapterKind, name: &str) -> AdapterInfo {
        AdapterInfo { id: Handle(id), kind, name: name.into() }
    }

    fn family(index: u32, caps: QueueCaps) -> QueueFamilyInfo {
        QueueFamilyInfo { index, caps, queue_count: 1 }
    }

    fn mem(index: u32, flags: MemoryFlags, heap_size: u64) -> MemoryTypeInfo {
        MemoryTypeInfo { index, flags, heap_index: index, heap_size }
    }

    #[test]
    fn discrete_wins_regardless_of_order() {
        let list = vec![
            adapter(1, AdapterKind::Integrated, "igpu"),
            adapter(2, AdapterKind::Cpu, "llvmpipe"),
            adapter(3, AdapterKind::Discrete, "dgpu"),
        ];
        assert_eq!(select_adapter(&list).unwrap().name, "dgpu");

        let list = vec![
            adapter(3, AdapterKind::Discrete, "dgpu"),
            adapter(1, AdapterKind::Integrated, "igpu"),
        ];
        assert_eq!(select_adapter(&list).unwrap().id, Handle(3));
    }

    #[test]
    fn first_integrated_when_no_discrete() {
        let list = vec![
            adapter(1, AdapterKind::Virtual, "virt"),
            adapter(2, AdapterKind::Integrated, "first"),
            adapter(3, AdapterKind::Integrated, "second"),
        ];
        assert_eq!(select_adapter(&list).unwrap().name, "first");
    }

    #[test]
    fn no_adapter_for_empty_or_unsupported() {
        assert!(select_adapter(&[]).is_none());
        let list = vec![adapter(1, AdapterKind::Cpu, "cpu"), adapter(2, AdapterKind::Other, "?")];
        assert!(select_adapter(&list).is_none());
    }

    #[test]
    fn last_match_wins_by_default() {
        let families = [
            family(0, QueueCaps::COMPUTE),
            family(1, QueueCaps::COMPUTE | QueueCaps::TRANSFER),
            family(2, QueueCaps::TRANSFER),
        ];
        let sel = select_queue_families(&families, QueueFamilyPolicy::default());
        assert_eq!(sel.compute, Some(1));
        assert_eq!(sel.transfer, Some(2));
    }

    #[test]
    fn first_match_policy_stops_early() {
        let families = [
            family(0, QueueCaps::COMPUTE),
            family(1, QueueCaps::COMPUTE | QueueCaps::TRANSFER),
            family(2, QueueCaps::TRANSFER),
        ];
        let sel = select_queue_families(&families, QueueFamilyPolicy::FirstMatch);
        assert_eq!(sel.compute, Some(0));
        assert_eq!(sel.transfer, Some(1));
    }

    #[test]
    fn missing_capability_is_absent_not_zero() {
        let families = [family(0, QueueCaps::GRAPHICS), family(1, QueueCaps::TRANSFER)];
        let sel = select_queue_families(&families, QueueFamilyPolicy::LastMatch);
        assert_eq!(sel.compute, None);
        assert_eq!(sel.transfer, Some(1));
        assert_eq!(select_queue_families(&[], QueueFamilyPolicy::LastMatch), QueueFamilySelection::default());
    }

    #[test]
    fn memory_type_first_superset_wins() {
        let host = MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT;
        let types = [
            mem(0, MemoryFlags::DEVICE_LOCAL, 8 << 30),
            mem(1, MemoryFlags::HOST_VISIBLE, 256 << 20),
            mem(2, host | MemoryFlags::HOST_CACHED, 16 << 30),
            mem(3, host, 1 << 20),
        ];
        let choice = select_memory_type(&types, host).unwrap();
        assert_eq!(choice, MemoryChoice { index: 2, heap_size: 16 << 30 });
    }

    #[test]
    fn memory_type_absent_when_nothing_qualifies() {
        let types = [mem(0, MemoryFlags::DEVICE_LOCAL, 1024), mem(1, MemoryFlags::HOST_VISIBLE, 1024)];
        assert!(select_memory_type(&types, MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT).is_none());
    }

    #[test]
    fn shared_family_yields_one_request() {
        let reqs = queue_requests(2, 2);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].family_index, 2);
        assert_eq!(reqs[0].queue_count, 1);

        let reqs = queue_requests(0, 1);
        assert_eq!(reqs.iter().map(|r| r.family_index).collect::<Vec<_>>(), vec![0, 1]);
        assert!(reqs.iter().all(|r| r.queue_count == 1));
    }
}
