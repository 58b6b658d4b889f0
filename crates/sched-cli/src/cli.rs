use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use sched_core::LoadPolicyKind;

/// Mirrors [`LoadPolicyKind`] for clap's `ValueEnum` derive — kept
/// separate so `sched-core` doesn't need to depend on `clap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemeArg {
    Lru,
    Plainrandom,
    Twobin,
    Weighted,
    Leastload,
    Pure,
}

impl From<SchemeArg> for LoadPolicyKind {
    fn from(arg: SchemeArg) -> Self {
        match arg {
            SchemeArg::Lru => LoadPolicyKind::Lru,
            SchemeArg::Plainrandom => LoadPolicyKind::PlainRandom,
            SchemeArg::Twobin => LoadPolicyKind::TwoBin,
            SchemeArg::Weighted => LoadPolicyKind::Weighted,
            SchemeArg::Leastload => LoadPolicyKind::LeastLoad,
            SchemeArg::Pure => LoadPolicyKind::Pure,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "sched-cli", version, about = "Task scheduler demo/runner")]
pub struct Cli {
    /// Path to the scheduler's TOML config file. Defaults to the XDG
    /// config dir if not given.
    #[arg(long, env = "SCHED_CONFIG_PATH")]
    pub config_path: Option<PathBuf>,

    /// Per-engine maximum of outstanding tasks. Overrides the config
    /// file when set; `0` disables the throttle.
    #[arg(long, env = "SCHED_HWM")]
    pub hwm: Option<u32>,

    /// Load-balancing policy. Overrides the config file when set.
    #[arg(long, env = "SCHED_SCHEME", value_enum)]
    pub scheme: Option<SchemeArg>,

    /// Grace period (seconds) before an engine's in-flight work is
    /// declared stranded after it unregisters.
    #[arg(long, env = "SCHED_STRANDED_GRACE_SECS")]
    pub stranded_grace_secs: Option<u64>,

    /// Number of simulated engines for the demo run.
    #[arg(long, env = "SCHED_DEMO_ENGINES", default_value_t = 3)]
    pub demo_engines: usize,

    /// Number of simulated tasks submitted by the demo client.
    #[arg(long, env = "SCHED_DEMO_TASKS", default_value_t = 10)]
    pub demo_tasks: usize,

    /// Write the resolved config back to `config_path` on startup.
    #[arg(long, env = "SCHED_SAVE_CONFIG", default_value_t = false)]
    pub save_config: bool,
}
