use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use vkdouble_core::backend::host::HostBackend;
use vkdouble_core::backend::ComputeBackend;
use vkdouble_core::config::{self, RunConfig};
use vkdouble_core::select::QueueFamilyPolicy;
use vkdouble_core::{pipeline, VERSION};

#[derive(Parser, Debug)]
#[command(name = "vkdouble", version = VERSION, about = "Double a buffer of floats with one compute dispatch")]
struct Cli {
    /// YAML run configuration; omitted fields keep their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Compute backend to drive
    #[arg(long, value_enum, global = true, default_value_t = BackendKind::default())]
    backend: BackendKind,
    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the pipeline and dispatch (the default)
    Run(RunArgs),
    /// List adapters with their queue families and memory types
    Devices,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Enable the validation layer
    #[arg(long)]
    validation: bool,
    /// Layer to enable instead of the Khronos validation layer; takes effect
    /// when validation is on, from this run or from the config file
    #[arg(long)]
    layer: Option<String>,
    /// Path to the precompiled shader binary
    #[arg(long)]
    shader: Option<PathBuf>,
    /// Stop after creating the buffer pair
    #[arg(long)]
    no_pipeline: bool,
    /// Build the pipeline but do not dispatch
    #[arg(long)]
    no_dispatch: bool,
    /// Take the first capable queue family instead of the last
    #[arg(long)]
    first_match: bool,
    /// Number of f32 elements per buffer
    #[arg(long)]
    elements: Option<u32>,
    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn apply(&self, cfg: &mut RunConfig) {
        if self.validation {
            cfg.validation.enabled = true;
        }
        if let Some(layer) = &self.layer {
            cfg.validation.layer = layer.clone();
        }
        if let Some(path) = &self.shader {
            cfg.shader.path = path.clone();
        }
        if self.no_pipeline {
            cfg.build_pipeline = false;
            cfg.dispatch = false;
        }
        if self.no_dispatch {
            cfg.dispatch = false;
        }
        if self.first_match {
            cfg.queue_policy = QueueFamilyPolicy::FirstMatch;
        }
        if let Some(n) = self.elements {
            cfg.element_count = n;
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    #[cfg(feature = "vulkan")]
    Vulkan,
    Host,
}

impl Default for BackendKind {
    fn default() -> Self {
        #[cfg(feature = "vulkan")]
        {
            BackendKind::Vulkan
        }
        #[cfg(not(feature = "vulkan"))]
        {
            BackendKind::Host
        }
    }
}

fn with_backend<T>(kind: BackendKind, f: impl FnOnce(&mut dyn ComputeBackend) -> Result<T>) -> Result<T> {
    match kind {
        #[cfg(feature = "vulkan")]
        BackendKind::Vulkan => {
            let mut backend = vkdouble_core::backend::vk::VulkanBackend::new()?;
            f(&mut backend)
        }
        BackendKind::Host => {
            let mut backend = HostBackend::new();
            f(&mut backend)
        }
    }
}

fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    let cli = Cli::parse();
    let mut cfg = match &cli.config {
        Some(path) => config::load_from_path(path)?,
        None => RunConfig::default(),
    };
    log::debug!("base config: {:?}", cfg);

    match cli.cmd.unwrap_or_else(|| Command::Run(RunArgs::default())) {
        Command::Run(args) => {
            args.apply(&mut cfg);
            let report = with_backend(cli.backend, |b| Ok(pipeline::run(b, &cfg)?))?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            println!("Adapter: {} ({})", report.adapter.name, report.adapter.kind.label());
            println!(
                "Queues: compute family {}, transfer family {} ({} request(s))",
                report.compute_family, report.transfer_family, report.queue_requests
            );
            println!("Memory: type {} (heap {} bytes)", report.memory.index, report.memory.heap_size);
            if report.output.is_some() {
                let shown = report.preview(cfg.preview);
                println!("First {} outputs:", shown.len());
                for (i, v) in shown.iter().enumerate() {
                    println!("  out[{}] = {}", i, v);
                }
            } else {
                println!("Stopped after {:?} stage", report.stage);
            }
        }
        Command::Devices => {
            let list = with_backend(cli.backend, |b| Ok(pipeline::list_devices(b, &cfg)?))?;
            if list.is_empty() {
                println!("No devices found");
            }
            for (i, d) in list.iter().enumerate() {
                let mark = if d.selected { "*" } else { " " };
                println!("{}[{}] {} ({})", mark, i, d.adapter.name, d.adapter.kind.label());
                for f in &d.families {
                    let caps: Vec<&str> = f.caps.iter_names().map(|(n, _)| n).collect();
                    println!("      queue family {}: {} x{}", f.index, caps.join("|"), f.queue_count);
                }
                for m in &d.memory_types {
                    let flags: Vec<&str> = m.flags.iter_names().map(|(n, _)| n).collect();
                    println!("      memory type {}: {} (heap {}, {} bytes)", m.index, flags.join("|"), m.heap_index, m.heap_size);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_invocation_runs_with_defaults() {
        let cli = Cli::try_parse_from(["vkdouble"]).unwrap();
        assert!(cli.cmd.is_none());
        assert!(cli.config.is_none());
        assert_eq!(cli.backend, BackendKind::default());
    }

    #[test]
    fn run_flags_override_config() {
        let cli = Cli::try_parse_from(["vkdouble", "--backend", "host", "run", "--no-pipeline", "--first-match", "--elements", "8"])
            .unwrap();
        assert_eq!(cli.backend, BackendKind::Host);
        let Some(Command::Run(args)) = cli.cmd else { panic!("expected run") };
        let mut cfg = RunConfig::default();
        args.apply(&mut cfg);
        assert!(!cfg.build_pipeline && !cfg.dispatch);
        assert_eq!(cfg.queue_policy, QueueFamilyPolicy::FirstMatch);
        assert_eq!(cfg.element_count, 8);
    }

    #[test]
    fn layer_applies_when_validation_comes_from_config() {
        let cli = Cli::try_parse_from(["vkdouble", "run", "--layer", "VK_LAYER_LUNARG_api_dump"]).unwrap();
        let Some(Command::Run(args)) = cli.cmd else { panic!("expected run") };

        let mut cfg = config::load_from_yaml_str("validation:\n  enabled: true\n").unwrap();
        args.apply(&mut cfg);
        assert_eq!(cfg.layer(), Some("VK_LAYER_LUNARG_api_dump"));

        let mut cfg = RunConfig::default();
        args.apply(&mut cfg);
        assert_eq!(cfg.layer(), None);
    }

    #[test]
    fn layer_with_validation_flag() {
        let cli = Cli::try_parse_from(["vkdouble", "run", "--validation", "--layer", "VK_LAYER_LUNARG_api_dump"]).unwrap();
        let Some(Command::Run(args)) = cli.cmd else { panic!("expected run") };
        let mut cfg = RunConfig::default();
        args.apply(&mut cfg);
        assert_eq!(cfg.layer(), Some("VK_LAYER_LUNARG_api_dump"));
    }

    #[test]
    fn host_backend_end_to_end() {
        let spv = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(spv.path(), [0x03, 0x02, 0x23, 0x07]).unwrap();
        let mut cfg = RunConfig::default();
        cfg.shader.path = spv.path().to_path_buf();
        let report = with_backend(BackendKind::Host, |b| Ok(pipeline::run(b, &cfg)?)).unwrap();
        assert_eq!(report.preview(3), &[0.0, 2.0, 4.0]);
    }
}
