// src/resolver/breaking.rs
//! Breaking-change based selection among same-version candidates
//!
//! Several local builds can declare the same nominal version. Rather than
//! always binding to the newest, candidates are walked in ascending version
//! order and the selection only moves forward when the dependent module
//! actually uses API surface a newer candidate added or changed. A
//! candidate the analyzer fails on is skipped and never becomes the diff
//! baseline.

use crate::cache::{Artifact, ArtifactIdentity};
use crate::module::ApiAnalyzer;
use tracing::{debug, info, warn};

pub struct BreakingChangeResolver<'a> {
    analyzer: &'a dyn ApiAnalyzer,
}

impl<'a> BreakingChangeResolver<'a> {
    pub fn new(analyzer: &'a dyn ApiAnalyzer) -> Self {
        Self { analyzer }
    }

    /// Select the candidate `parent` should bind to
    ///
    /// Returns `None` only when there are no candidates.
    pub fn resolve(&self, candidates: &[&Artifact], parent: &Artifact) -> Option<ArtifactIdentity> {
        let mut ordered: Vec<&Artifact> = candidates.to_vec();
        ordered.sort_by(|a, b| a.version().cmp(b.version()));

        let mut remaining = ordered.into_iter();
        let first = remaining.next()?;
        let mut selected = first;
        let mut baseline = first;

        for candidate in remaining {
            if !candidate.path().exists() {
                debug!("Skipping {}: {} is missing", candidate.identity(), candidate.path().display());
                continue;
            }
            if !baseline.path().exists() {
                baseline = candidate;
                continue;
            }

            let diff = match self.analyzer.diff(baseline.path(), candidate.path()) {
                Ok(diff) => diff,
                Err(e) => {
                    warn!(
                        "Unable to diff {} against {}, {} is skipped: {}",
                        baseline.identity(),
                        candidate.identity(),
                        candidate.identity(),
                        e
                    );
                    continue;
                }
            };

            if diff.is_empty() {
                debug!("No API change from {} to {}", baseline.identity(), candidate.identity());
                baseline = candidate;
                continue;
            }

            match self.analyzer.uses(parent.path(), &diff) {
                Ok(true) => {
                    info!(
                        "{} uses API introduced by {}, selecting it",
                        parent.identity(),
                        candidate.identity()
                    );
                    selected = candidate;
                }
                Ok(false) => debug!(
                    "{} does not use API introduced by {}",
                    parent.identity(),
                    candidate.identity()
                ),
                Err(e) => {
                    warn!(
                        "Unable to analyze usage of {} by {}, it is skipped: {}",
                        candidate.identity(),
                        parent.identity(),
                        e
                    );
                    continue;
                }
            }
            baseline = candidate;
        }

        Some(selected.identity().clone())
    }
}
