//! Interactive session state: regions, their ids, and published results.
//!
//! A [`Session`] is the only mutable state in the crate. Recomputation
//! happens in [`AnalysisJob`]s that own everything they read, so a job can
//! run on another thread while the session keeps serving the previously
//! published results. Each job carries a generation number; only the
//! output of the most recent job is accepted by [`Session::publish`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::id::IdAllocator;
use crate::pipeline::{Pipeline, RegionAnalysis};
use crate::structure::{Region, RoiContours};
use crate::types::{PipelineConfig, PipelineError};
use crate::volume::Volume;

/// Regions on one volume plus their latest analyses.
#[derive(Debug)]
pub struct Session {
    volume: Arc<Volume>,
    config: PipelineConfig,
    ids: IdAllocator,
    regions: Vec<Region>,
    published: HashMap<String, Arc<RegionAnalysis>>,
    generation: u64,
    active: Option<CancelToken>,
}

impl Session {
    /// A session with no regions.
    #[must_use]
    pub fn new(volume: Arc<Volume>, config: PipelineConfig) -> Self {
        Self {
            volume,
            config,
            ids: IdAllocator::new(),
            regions: Vec::new(),
            published: HashMap::new(),
            generation: 0,
            active: None,
        }
    }

    /// The volume every region is measured on.
    #[must_use]
    pub const fn volume(&self) -> &Arc<Volume> {
        &self.volume
    }

    /// Current pipeline configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Replace the configuration. Published results are kept until the
    /// next recompute.
    pub fn set_config(&mut self, config: PipelineConfig) {
        self.config = config;
    }

    /// Regions in insertion order.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// The region with this id.
    #[must_use]
    pub fn region(&self, id: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.id() == id)
    }

    /// Add a region under the next free id and return that id.
    pub fn add_region(&mut self, roi: RoiContours) -> String {
        let id = self.ids.allocate();
        tracing::debug!(%id, name = %roi.name, "added region");
        self.regions.push(Region::new(id.clone(), roi));
        id
    }

    /// Add a region under a known id, e.g. when restoring a saved session.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DuplicateRegion`] if the id was already
    /// issued or reserved.
    pub fn restore_region(&mut self, id: &str, roi: RoiContours) -> Result<(), PipelineError> {
        if !self.ids.reserve(id) {
            return Err(PipelineError::DuplicateRegion(id.to_string()));
        }
        self.regions.push(Region::new(id, roi));
        Ok(())
    }

    /// Remove a region and its published result. Its id is not reused.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownRegion`] if no region has this id.
    pub fn remove_region(&mut self, id: &str) -> Result<Region, PipelineError> {
        let index = self
            .regions
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| PipelineError::UnknownRegion(id.to_string()))?;
        self.published.remove(id);
        Ok(self.regions.remove(index))
    }

    /// The latest published analysis for a region.
    #[must_use]
    pub fn analysis(&self, id: &str) -> Option<Arc<RegionAnalysis>> {
        self.published.get(id).cloned()
    }

    /// Published analyses in region order; regions not yet computed are
    /// skipped.
    #[must_use]
    pub fn analyses(&self) -> Vec<Arc<RegionAnalysis>> {
        self.regions
            .iter()
            .filter_map(|r| self.published.get(r.id()).cloned())
            .collect()
    }

    /// Generation of the most recently prepared job.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Snapshot the given regions into a job. Any job prepared earlier is
    /// cancelled and its output will be refused.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownRegion`] for the first id that is
    /// not in the session.
    pub fn prepare(&mut self, ids: &[&str]) -> Result<AnalysisJob, PipelineError> {
        let regions = ids
            .iter()
            .map(|id| {
                self.region(id)
                    .cloned()
                    .ok_or_else(|| PipelineError::UnknownRegion((*id).to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.snapshot(regions))
    }

    /// Snapshot every region into a job.
    pub fn prepare_all(&mut self) -> AnalysisJob {
        let regions = self.regions.clone();
        self.snapshot(regions)
    }

    fn snapshot(&mut self, regions: Vec<Region>) -> AnalysisJob {
        if let Some(previous) = self.active.take() {
            previous.cancel();
        }
        self.generation += 1;
        let cancel = CancelToken::new();
        self.active = Some(cancel.clone());
        tracing::debug!(
            generation = self.generation,
            regions = regions.len(),
            "prepared analysis job"
        );
        AnalysisJob {
            generation: self.generation,
            volume: Arc::clone(&self.volume),
            regions,
            config: self.config.clone(),
            cancel,
        }
    }

    /// Install a job's results.
    ///
    /// Output from any job other than the most recently prepared one is
    /// ignored. Results for regions removed while the job ran are
    /// dropped. Either every remaining region is updated or none is.
    /// Returns whether the output was accepted.
    pub fn publish(&mut self, output: JobOutput) -> bool {
        if output.generation != self.generation {
            tracing::debug!(
                stale = output.generation,
                current = self.generation,
                "ignored stale analysis"
            );
            return false;
        }
        self.active = None;
        for analysis in output.analyses {
            let id = analysis.region().id().to_string();
            if self.region(&id).is_some() {
                self.published.insert(id, Arc::new(analysis));
            }
        }
        true
    }

    /// Recompute the given regions on the calling thread and publish.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownRegion`] for an unknown id, or any
    /// error from the run. Nothing is published on error.
    pub fn recompute(&mut self, ids: &[&str]) -> Result<(), PipelineError> {
        let output = self.prepare(ids)?.run()?;
        self.publish(output);
        Ok(())
    }

    /// Recompute every region on the calling thread and publish.
    ///
    /// # Errors
    ///
    /// Any error from the run. Nothing is published on error.
    pub fn recompute_all(&mut self) -> Result<(), PipelineError> {
        let output = self.prepare_all().run()?;
        self.publish(output);
        Ok(())
    }
}

/// A self-contained recompute of some regions.
#[derive(Debug)]
pub struct AnalysisJob {
    generation: u64,
    volume: Arc<Volume>,
    regions: Vec<Region>,
    config: PipelineConfig,
    cancel: CancelToken,
}

impl AnalysisJob {
    /// Generation this job was prepared as.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Token that stops this job.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the pipeline over the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cancelled`] if the job was cancelled,
    /// or any other pipeline error.
    pub fn run(self) -> Result<JobOutput, PipelineError> {
        let analysis = Pipeline::new(self.volume, self.regions, self.config)
            .match_slices()
            .rasterize(&self.cancel)?
            .measure()?
            .into_result();
        Ok(JobOutput {
            generation: self.generation,
            analyses: analysis.regions,
        })
    }
}

/// Results of a finished job, ready for [`Session::publish`].
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutput {
    generation: u64,
    analyses: Vec<RegionAnalysis>,
}

impl JobOutput {
    /// Generation of the job that produced this output.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Per-region results.
    #[must_use]
    pub fn analyses(&self) -> &[RegionAnalysis] {
        &self.analyses
    }
}
