//! Per-profile extraction run
//!
//! Order within a profile is fixed: load key material, resolve the master
//! key, then extract the requested kinds. A key failure stops that profile
//! only. Kinds run on a bounded rayon pool and each checks the deadline
//! before it starts.

use crate::assembler::DecodeContext;
use crate::browsers::{ArtifactKind, Profile};
use crate::config::ExtractConfig;
use crate::error::{ProfileError, ProfileResult};
use crate::field::FieldDecryptor;
use crate::key_source::{self, MasterKeyMaterial};
use crate::master_key::{MasterKeyResolver, StageObserver};
use crate::os_unwrap::OsUnwrap;
use crate::records::Extraction;
use crate::registry;
use rayon::prelude::*;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of one artifact kind.
#[derive(Debug)]
pub struct KindOutcome {
    pub kind: ArtifactKind,
    pub result: ProfileResult<Extraction>,
}

/// Everything that came out of one profile.
#[derive(Debug)]
pub struct ProfileReport {
    pub profile: Profile,
    /// `Err` when the master key could not be resolved
    pub kinds: ProfileResult<Vec<KindOutcome>>,
}

impl ProfileReport {
    pub fn extractions(&self) -> impl Iterator<Item = &Extraction> {
        self.kinds
            .as_ref()
            .map(|k| k.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
    }
}

pub struct Pipeline<'a> {
    config: &'a ExtractConfig,
    os: &'a dyn OsUnwrap,
    observer: Option<&'a dyn StageObserver>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a ExtractConfig, os: &'a dyn OsUnwrap) -> Self {
        Self {
            config,
            os,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: &'a dyn StageObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run every profile; a failing profile never affects the others.
    pub fn run_all(&self, profiles: &[Profile]) -> Vec<ProfileReport> {
        profiles.iter().map(|p| self.run(p)).collect()
    }

    pub fn run(&self, profile: &Profile) -> ProfileReport {
        let deadline = self.config.deadline().map(|d| Instant::now() + d);
        let kinds = key_source::load_for(profile).and_then(|material| self.extract(profile, &material, deadline));
        if let Err(e) = &kinds {
            warn!("⚠️  Skipping profile {}: {}", profile.name(), e);
        }
        ProfileReport {
            profile: profile.clone(),
            kinds,
        }
    }

    /// Resolve the key from already-loaded material and extract.
    pub fn extract(
        &self,
        profile: &Profile,
        material: &MasterKeyMaterial,
        deadline: Option<Instant>,
    ) -> ProfileResult<Vec<KindOutcome>> {
        if material.family() != profile.family {
            return Err(ProfileError::KeyMaterialUnavailable(format!(
                "{} key material for a {} profile",
                material.family(),
                profile.family
            )));
        }

        let mut resolver = MasterKeyResolver::new(self.os).with_password(&self.config.master_password);
        if let Some(observer) = self.observer {
            resolver = resolver.with_observer(observer);
        }
        let key = resolver.resolve(material)?;
        info!("🔑 Master key ready for {}", profile.name());

        let ctx = DecodeContext::new(profile.family, &key, FieldDecryptor::new(self.os));
        let kinds: Vec<ArtifactKind> = self
            .config
            .kinds
            .iter()
            .copied()
            .filter(|k| {
                let known = registry::lookup(profile.family, *k).is_some();
                if !known {
                    debug!("{} profiles do not store {}, skipping", profile.family, k);
                }
                known
            })
            .collect();

        let run_kind = |kind: ArtifactKind| self.extract_kind(profile, &ctx, kind, deadline);

        let outcomes = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.worker_count())
            .build()
        {
            Ok(pool) => pool.install(|| kinds.par_iter().map(|k| run_kind(*k)).collect()),
            Err(e) => {
                warn!("⚠️  Worker pool unavailable ({}), extracting sequentially", e);
                kinds.iter().map(|k| run_kind(*k)).collect()
            }
        };
        Ok(outcomes)
    }

    fn extract_kind(
        &self,
        profile: &Profile,
        ctx: &DecodeContext<'_>,
        kind: ArtifactKind,
        deadline: Option<Instant>,
    ) -> KindOutcome {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            debug!("Deadline passed before {} started", kind);
            return KindOutcome {
                kind,
                result: Err(ProfileError::DeadlineExceeded),
            };
        }

        let started = Instant::now();
        let result = match registry::lookup(profile.family, kind) {
            Some(entry) => (entry.extract)(profile, ctx),
            None => Err(ProfileError::Source(format!("no extractor for {} {}", profile.family, kind))),
        };
        match &result {
            Ok(extraction) => {
                if !extraction.diagnostics.is_empty() {
                    warn!(
                        "⚠️  {} {}: {} row(s) with problems",
                        profile.name(),
                        kind,
                        extraction.diagnostics.len()
                    );
                }
                debug!(
                    "{} {}: {} records in {:?}",
                    profile.name(),
                    kind,
                    extraction.records.len(),
                    elapsed(started)
                );
            }
            Err(e) => warn!("⚠️  {} {}: {}", profile.name(), kind, e),
        }
        KindOutcome { kind, result }
    }
}

fn elapsed(since: Instant) -> Duration {
    Instant::now().saturating_duration_since(since)
}
