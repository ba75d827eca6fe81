use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{error, info};

use crate::config::RunConfig;
use crate::domain::LibraryType;
use crate::error::RavenError;
use crate::finalize::{FinalizeSummary, ResultFinalizer};
use crate::library::LibraryTypeResolver;
use crate::runner::StageRunner;
use crate::stages::{self, StageKind, StageStep, ViralHits};
use crate::timelog::{StageRecord, Timelog};
use crate::tool::ToolExecutor;
use crate::workspace::{WorkspaceLayout, WorkspaceManager, copy_if_changed, ensure_dir};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    NotStarted,
    Running(usize),
    Completed,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub stage: &'static str,
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub project_id: String,
    pub run_label: String,
    pub library_type: LibraryType,
    pub final_dir: Utf8PathBuf,
    pub records: Vec<StageRecord>,
    pub viral_hits: Option<ViralHits>,
    pub finalize: Option<FinalizeSummary>,
}

/// Runs the stages of one run, strictly in order, stopping at the first fatal error.
pub struct PipelineDriver<E: ToolExecutor> {
    config: RunConfig,
    layout: WorkspaceLayout,
    runner: StageRunner<E>,
    state: PipelineState,
    built_database: bool,
    viral_hits: Option<ViralHits>,
    finalize: Option<FinalizeSummary>,
}

impl<E: ToolExecutor> PipelineDriver<E> {
    pub fn new(config: RunConfig, executor: E) -> Self {
        let layout = WorkspaceLayout::new(&config);
        let timelog = Timelog::new(layout.timelog_path());
        let runner = StageRunner::new(executor, timelog, config.resume());
        Self {
            config,
            layout,
            runner,
            state: PipelineState::NotStarted,
            built_database: false,
            viral_hits: None,
            finalize: None,
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    pub fn records(&self) -> &[StageRecord] {
        self.runner.records()
    }

    pub fn run(&mut self, sink: &dyn ProgressSink) -> Result<RunReport, RavenError> {
        if let Err(err) = self.prepare() {
            error!(error = %err, "workspace preparation failed");
            self.state = PipelineState::Failed("prepare".to_string());
            return Err(err);
        }

        for (index, kind) in StageKind::ALL.into_iter().enumerate() {
            self.state = PipelineState::Running(index);
            let started = Instant::now();
            sink.event(ProgressEvent {
                stage: kind.name(),
                message: "started".to_string(),
                elapsed: None,
            });
            if let Err(err) = self.run_kind(kind) {
                error!(stage = kind.name(), error = %err, "pipeline halted");
                self.state = PipelineState::Failed(kind.name().to_string());
                sink.event(ProgressEvent {
                    stage: kind.name(),
                    message: format!("failed: {err}"),
                    elapsed: Some(started.elapsed()),
                });
                return Err(err);
            }
            sink.event(ProgressEvent {
                stage: kind.name(),
                message: "finished".to_string(),
                elapsed: Some(started.elapsed()),
            });
        }

        self.state = PipelineState::Completed;
        self.runner.timelog().complete(self.layout.final_dir())?;
        let timelog = self.runner.timelog().path().to_path_buf();
        let published = self
            .layout
            .final_dir()
            .join("analysis/timelogs")
            .join(format!("{}.log", self.layout.run_label()));
        copy_if_changed(&timelog, &published)?;
        info!(final_dir = %self.layout.final_dir(), "run complete");

        Ok(RunReport {
            project_id: self.config.project_id().to_string(),
            run_label: self.config.run_label().to_string(),
            library_type: self.config.library_type(),
            final_dir: self.layout.final_dir().to_path_buf(),
            records: self.runner.records().to_vec(),
            viral_hits: self.viral_hits,
            finalize: self.finalize.clone(),
        })
    }

    fn prepare(&mut self) -> Result<(), RavenError> {
        WorkspaceManager::ensure_layout(&self.layout)?;
        self.runner.timelog().run_header(
            self.config.project_id(),
            self.config.run_label(),
            self.config.sample_accessions().len(),
        )?;
        WorkspaceManager::install_helpers(&self.layout)?;
        Ok(())
    }

    fn run_steps(&mut self, steps: &[StageStep]) -> Result<(), RavenError> {
        for step in steps {
            self.runner
                .run_stage(&step.name, &step.invocation, step.policy)?;
        }
        Ok(())
    }

    fn run_kind(&mut self, kind: StageKind) -> Result<(), RavenError> {
        match kind {
            StageKind::Download => {
                let steps = stages::download(&self.config, &self.layout);
                self.run_steps(&steps)
            }
            StageKind::DetermineLibraryType => self.determine_library_type(),
            StageKind::TrimAdapters => {
                let steps = stages::trim_adapters(&self.config, &self.layout)?;
                self.run_steps(&steps)
            }
            StageKind::AssembleContigs => self.assemble(),
            StageKind::ClassifyTaxonomy => {
                let plan = stages::classify_taxonomy(&self.config, &self.layout)?;
                if let Some(makedb) = &plan.makedb {
                    ensure_dir(&self.layout.databases_dir())?;
                    self.run_steps(std::slice::from_ref(makedb))?;
                    self.built_database = plan.built_database.is_some();
                }
                self.run_steps(std::slice::from_ref(&plan.blastx))
            }
            StageKind::TranslateTaxonomy => {
                let step = stages::translate_taxonomy(&self.config, &self.layout)?;
                self.run_steps(std::slice::from_ref(&step))
            }
            StageKind::MapReads => {
                let steps = stages::map_reads(&self.config, &self.layout)?;
                self.run_steps(&steps)
            }
            StageKind::ExtractViralSequences => {
                let layout = &self.layout;
                let hits = self.runner.run_internal("extract_viral_sequences select", || {
                    stages::select_viral_hits(
                        &layout.taxonomy_path(),
                        &layout.viruses_taxonomy_path(),
                        &layout.viruses_ids_path(),
                    )
                })?;
                info!(rows = hits.rows, contigs = hits.contigs, "viral hits selected");
                self.viral_hits = Some(hits);
                let step = stages::extract_viral_sequences(&self.layout);
                self.run_steps(std::slice::from_ref(&step))
            }
            StageKind::Finalize => {
                let layout = &self.layout;
                let built = self.built_database;
                let summary = self
                    .runner
                    .run_internal("finalize", || ResultFinalizer::finalize(layout, built))?;
                self.finalize = Some(summary);
                Ok(())
            }
        }
    }

    /// Runs only when no library type was given; must precede trimming.
    fn determine_library_type(&mut self) -> Result<(), RavenError> {
        if self.config.library_type().is_resolved() {
            info!(library = %self.config.library_type(), "library type given, detection skipped");
            return Ok(());
        }
        let config = &self.config;
        let raw_dir = self.layout.raw_reads_dir();
        let library = self
            .runner
            .run_internal(StageKind::DetermineLibraryType.name(), || {
                LibraryTypeResolver::resolve(
                    config.library_type(),
                    config.sample_accessions(),
                    &raw_dir,
                )
            })?;
        self.config = self.config.clone().resolve_library_type(library)?;
        Ok(())
    }

    fn assemble(&mut self) -> Result<(), RavenError> {
        let plan = stages::assemble_contigs(&self.config, &self.layout)?;
        plan.descriptor.write(&self.layout.descriptor_path())?;
        self.run_steps(std::slice::from_ref(&plan.step))?;

        let contigs = self.layout.contigs_path();
        let source = if plan.assembler_output.as_std_path().is_file() {
            plan.assembler_output
        } else if contigs.as_std_path().is_file() {
            contigs.clone()
        } else {
            return Err(RavenError::Filesystem(format!(
                "assembler produced no {}",
                plan.assembler_output
            )));
        };
        if source != contigs {
            copy_if_changed(&source, &contigs)?;
        }
        copy_if_changed(&source, &self.layout.data_contigs_path())?;
        Ok(())
    }
}
