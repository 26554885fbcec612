//! Scoped ownership of backend objects.
//!
//! Every object goes into the scope the moment it is created. Dropping the
//! scope hands them back in reverse order, whichever way the caller leaves.

use log::debug;

use crate::backend::{BackendResult, ComputeBackend, Handle, Resource, ResourceKind};

pub struct ResourceScope<'b, B: ComputeBackend + ?Sized> {
    backend: &'b mut B,
    held: Vec<Resource>,
}

impl<'b, B: ComputeBackend + ?Sized> ResourceScope<'b, B> {
    pub fn new(backend: &'b mut B) -> Self {
        Self { backend, held: Vec::new() }
    }

    /// Direct access for calls that do not create releasable objects.
    pub fn backend(&mut self) -> &mut B {
        &mut *self.backend
    }

    /// Run `create` and take ownership of the handle it returns.
    pub fn acquire<F>(&mut self, kind: ResourceKind, owner: Option<Handle>, create: F) -> BackendResult<Handle>
    where
        F: FnOnce(&mut B) -> BackendResult<Handle>,
    {
        let handle = create(&mut *self.backend)?;
        debug!("acquire {:?} {}", kind, handle);
        self.held.push(Resource { kind, handle, owner });
        Ok(handle)
    }

    pub fn held(&self) -> &[Resource] {
        &self.held
    }

    pub fn release_all(&mut self) {
        while let Some(res) = self.held.pop() {
            debug!("release {:?} {}", res.kind, res.handle);
            self.backend.release(res);
        }
    }
}

impl<B: ComputeBackend + ?Sized> Drop for ResourceScope<'_, B> {
    fn drop(&mut self) {
        self.release_all();
    }
}
