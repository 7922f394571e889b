use anyhow::Result;
use log::info;

pub mod discovery;
pub mod preparation;
pub mod prompt;
pub mod provision;
pub mod selection;
pub mod session;

pub use discovery::{resolve_candidate, scan, scan_matching};
pub use preparation::{prompt_base_name, prompt_hub_config, MetadataMode, ProvisionPlan};
pub use prompt::{LinePrompt, Prompt, QUIT_TOKEN};
pub use provision::{
    eject_disk, format_and_provision, EjectError, ProvisionError, ProvisionObserver,
    ProvisionStage,
};
pub use selection::{InteractiveSelection, Selection, SelectionPolicy, TargetNameSelection};
pub use session::{CycleOutcome, InteractiveSession, SessionSummary, StopSignal, UnattendedSession};

pub trait Workflow {
    fn name(&self) -> &'static str;
    fn run(&mut self) -> Result<SessionSummary>;
}

pub fn run_workflow<W: Workflow>(mut workflow: W) -> Result<SessionSummary> {
    info!("starting {} session", workflow.name());
    let summary = workflow.run()?;
    info!(
        "{} session ended, {} drive(s) formatted",
        workflow.name(),
        summary.formatted
    );
    Ok(summary)
}
