//! A project together with the store it compiles into.

use std::path::Path;

use log::{error, info, warn};

use crate::disc::{self, AddressTable, DiscSummary};
use crate::gen::{passes, PassContext};
use crate::persist;
use crate::project::Project;
use crate::report::CompileReport;
use crate::store::FileStore;
use crate::{ForgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceState {
    /// Opened or edited since the last successful compile.
    Open,
    Compiling,
    /// A pass failed. Writes of earlier passes are still staged.
    Failed,
    Saved,
}

pub struct Workspace {
    pub project: Project,
    pub store: FileStore,
    state: WorkspaceState,
}

impl Workspace {
    pub fn new(project: Project, store: FileStore) -> Self {
        Workspace {
            project,
            store,
            state: WorkspaceState::Open,
        }
    }

    /// Opens the store at `path` and loads its project. A store without a
    /// project starts from an empty one.
    pub fn open(path: &Path) -> Result<Self> {
        let store = FileStore::open(path)?;
        let project = match persist::load_project(&store)? {
            Some(project) => project,
            None => {
                info!("No project found in {}, starting a new one", path.display());
                Project::default()
            }
        };
        Ok(Workspace::new(project, store))
    }

    pub fn state(&self) -> WorkspaceState {
        self.state
    }

    /// Runs every pass in order, then persists the project and flushes the
    /// store. The first failing pass aborts the compile and nothing is
    /// flushed.
    pub fn compile(&mut self) -> Result<CompileReport> {
        self.state = WorkspaceState::Compiling;
        let mut report = CompileReport::default();

        for pass in passes() {
            let name = pass.name();
            info!("Running {name} pass");
            let result = {
                let mut ctx = PassContext::new(name, &mut self.project, &mut self.store, &mut report.warnings);
                pass.run(&mut ctx)
            };
            match result {
                Ok(true) => report.completed.push(name),
                Ok(false) => {
                    warn!("Template for the {name} pass is missing, skipping it");
                    report.skipped.push(name);
                }
                Err(e) => return Err(self.fail(name, e)),
            }
        }

        if let Err(e) = persist::save_project(&mut self.store, &self.project) {
            return Err(self.fail("project", e));
        }
        if let Err(e) = self.store.save() {
            return Err(self.fail("flush", e.into()));
        }

        self.state = WorkspaceState::Saved;
        info!(
            "Compile finished: {} passes run, {} skipped, {} warnings",
            report.completed.len(),
            report.skipped.len(),
            report.warnings.len()
        );
        Ok(report)
    }

    fn fail(&mut self, pass: &'static str, source: ForgeError) -> ForgeError {
        error!("{pass} pass failed: {source}");
        self.state = WorkspaceState::Failed;
        ForgeError::Pass {
            pass,
            source: Box::new(source),
        }
    }

    /// Assembles the store into a disc image at `output`.
    pub fn build_disc(&self, output: &Path, table: Option<&AddressTable>) -> Result<DiscSummary> {
        if self.store.is_dirty() {
            warn!("Building a disc from a store with unsaved changes");
        }
        Ok(disc::build_disc(&self.store, output, table, &self.project.build)?)
    }
}
