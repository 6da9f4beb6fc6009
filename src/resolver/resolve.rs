//! The group resolver.
//!
//! # Policy
//!
//! For one destination directory:
//!
//! 1. Source files and existing entries are partitioned into name collision
//!    sets by [`collision_key`] (suffixed names fold onto their base name).
//! 2. Each set is partitioned by content id into duplicate groups. The oldest
//!    member of a group (ties broken by path) is the one copied.
//! 3. A group whose content is already present in the set under some name is
//!    satisfied by that entry and needs no copy.
//! 4. The remaining groups are ranked newest first. The newest keeps the bare
//!    base name if it is free; every other group gets a timestamp suffix, and
//!    a numeric discriminator if that is taken too.
//! 5. Existing names are never reassigned. If one of them is held by a file
//!    of unknown content and incoming content needs it, resolution fails.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use super::naming::{self, collision_key, name_key, FIRST_DISCRIMINATOR};
use super::{
    Assignment, ContentId, ContentVerifier, Diagnostic, ExistingEntry, Placement,
    PlacementAction, ResolveError, SourceFile,
};

/// Options affecting how names are compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Treat names differing only in case as colliding.
    pub ignore_case: bool,
}

impl ResolverConfig {
    /// Set case-insensitive name comparison.
    #[must_use]
    pub fn with_ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }
}

/// Computes an [`Assignment`] for one destination directory.
///
/// The resolver holds no state between calls; resolving the same inputs
/// twice yields the same assignment.
#[derive(Clone, Default)]
pub struct GroupResolver {
    config: ResolverConfig,
    verifier: Option<Arc<dyn ContentVerifier>>,
}

impl std::fmt::Debug for GroupResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupResolver")
            .field("config", &self.config)
            .field("verifier", &self.verifier.as_ref().map(|_| "<verifier>"))
            .finish()
    }
}

/// Source files and existing entries sharing one collision key.
#[derive(Default)]
struct CollisionSet<'a> {
    groups: BTreeMap<&'a ContentId, Vec<&'a SourceFile>>,
    existing: Vec<&'a ExistingEntry>,
}

/// A duplicate group with its copy source selected.
struct Group<'a> {
    content: &'a ContentId,
    selected: &'a SourceFile,
    rest: Vec<&'a SourceFile>,
}

impl<'a> Group<'a> {
    fn select(content: &'a ContentId, members: &[&'a SourceFile]) -> Self {
        let mut ordered = members.to_vec();
        ordered.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
        let selected = ordered.remove(0);
        Self {
            content,
            selected,
            rest: ordered,
        }
    }

    fn base(&self) -> Cow<'a, str> {
        naming::base_name(&self.selected.name)
    }

    fn modified(&self) -> SystemTime {
        self.selected.modified
    }

    fn into_placement(self, name: String, action: PlacementAction) -> Placement {
        Placement {
            name,
            content: self.content.clone(),
            source: self.selected.path.clone(),
            modified: self.selected.modified,
            duplicates: self.rest.iter().map(|f| f.path.clone()).collect(),
            action,
        }
    }
}

/// Who holds a filename in the directory being resolved.
enum Holder<'a> {
    Existing(&'a ExistingEntry),
    Assigned,
}

impl GroupResolver {
    /// Create a resolver that trusts the detector's grouping.
    #[must_use]
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            verifier: None,
        }
    }

    /// Verify group members and already-present entries before trusting them.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn ContentVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Resolver configuration.
    #[must_use]
    pub fn config(&self) -> ResolverConfig {
        self.config
    }

    /// Resolve the filenames for one destination directory.
    ///
    /// # Arguments
    ///
    /// * `directory` - Destination directory (used for verification and errors)
    /// * `sources` - Incoming files bound for this directory
    /// * `existing` - Files already in the directory
    ///
    /// # Errors
    ///
    /// * [`ResolveError::ImmovableOccupant`] if a file of unknown content holds
    ///   a name that incoming content needs.
    /// * [`ResolveError::Integrity`] if a verifier is set and files grouped
    ///   under one content id differ.
    /// * [`ResolveError::Verify`] if a file cannot be read for verification.
    pub fn resolve(
        &self,
        directory: &Path,
        sources: &[SourceFile],
        existing: &[ExistingEntry],
    ) -> Result<Assignment, ResolveError> {
        let ignore_case = self.config.ignore_case;

        let mut sets: BTreeMap<String, CollisionSet<'_>> = BTreeMap::new();
        for file in sources {
            sets.entry(collision_key(&file.name, ignore_case))
                .or_default()
                .groups
                .entry(&file.content)
                .or_default()
                .push(file);
        }
        for entry in existing {
            sets.entry(collision_key(&entry.name, ignore_case))
                .or_default()
                .existing
                .push(entry);
        }

        let mut taken: HashMap<String, Holder<'_>> = existing
            .iter()
            .map(|e| (name_key(&e.name, ignore_case), Holder::Existing(e)))
            .collect();

        let mut placements = Vec::new();
        let mut diagnostics = Vec::new();
        for (key, set) in &sets {
            if set.groups.is_empty() {
                continue;
            }
            log::trace!(
                "Collision set '{}': {} group(s), {} existing",
                key,
                set.groups.len(),
                set.existing.len()
            );
            let mut resolved = self.resolve_set(directory, set, &mut taken, &mut diagnostics)?;
            resolved.sort_by(|a, b| a.name.cmp(&b.name));
            placements.extend(resolved);
        }

        log::debug!(
            "Resolved {}: {} placement(s), {} collision(s)",
            directory.display(),
            placements.len(),
            diagnostics.len()
        );

        Ok(Assignment {
            directory: directory.to_path_buf(),
            placements,
            diagnostics,
        })
    }

    fn resolve_set<'a>(
        &self,
        directory: &Path,
        set: &CollisionSet<'a>,
        taken: &mut HashMap<String, Holder<'a>>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<Vec<Placement>, ResolveError> {
        let mut placements = Vec::with_capacity(set.groups.len());
        let mut pending = Vec::new();

        for (&content, members) in &set.groups {
            let group = Group::select(content, members);
            self.verify_members(directory, &group)?;

            match self.satisfying_entry(directory, &group, &set.existing)? {
                Some(entry) => {
                    log::debug!(
                        "skipped {} (already present as '{}')",
                        group.selected.path.display(),
                        entry.name
                    );
                    placements.push(group.into_placement(
                        entry.name.clone(),
                        PlacementAction::AlreadyPresent,
                    ));
                }
                None => pending.push(group),
            }
        }

        pending.sort_by(|a, b| {
            b.modified()
                .cmp(&a.modified())
                .then_with(|| a.content.cmp(b.content))
        });

        for (rank, group) in pending.into_iter().enumerate() {
            let name = self.assign_name(directory, &group, rank == 0, taken, diagnostics)?;
            taken.insert(name_key(&name, self.config.ignore_case), Holder::Assigned);
            log::trace!("{} -> '{}'", group.selected.path.display(), name);
            placements.push(group.into_placement(name, PlacementAction::Copy));
        }

        Ok(placements)
    }

    /// Pick the filename for a group that still needs copying.
    fn assign_name(
        &self,
        directory: &Path,
        group: &Group<'_>,
        keep_base: bool,
        taken: &HashMap<String, Holder<'_>>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<String, ResolveError> {
        let base = group.base();
        if keep_base && self.is_free(directory, &base, group, taken)? {
            return Ok(base.into_owned());
        }

        let suffixed = naming::disambiguate(&base, group.modified(), None);
        if self.is_free(directory, &suffixed, group, taken)? {
            return Ok(suffixed);
        }

        let mut discriminator = FIRST_DISCRIMINATOR;
        loop {
            let candidate = naming::disambiguate(&base, group.modified(), Some(discriminator));
            if self.is_free(directory, &candidate, group, taken)? {
                log::warn!(
                    "Name collision in {}: '{}' is taken, using '{}' for content {}",
                    directory.display(),
                    suffixed,
                    candidate,
                    group.content
                );
                diagnostics.push(Diagnostic::Collision {
                    taken: suffixed,
                    assigned: candidate.clone(),
                    content: group.content.clone(),
                });
                return Ok(candidate);
            }
            discriminator += 1;
        }
    }

    /// Whether `name` can be given to `group`.
    fn is_free(
        &self,
        directory: &Path,
        name: &str,
        group: &Group<'_>,
        taken: &HashMap<String, Holder<'_>>,
    ) -> Result<bool, ResolveError> {
        match taken.get(&name_key(name, self.config.ignore_case)) {
            None => Ok(true),
            Some(Holder::Existing(entry)) if entry.content.is_none() => {
                log::error!(
                    "'{}' in {} has unknown content and collides with {}",
                    entry.name,
                    directory.display(),
                    group.selected.path.display()
                );
                Err(ResolveError::ImmovableOccupant {
                    directory: directory.to_path_buf(),
                    name: entry.name.clone(),
                    key: group.content.clone(),
                })
            }
            Some(_) => Ok(false),
        }
    }

    /// Find an existing entry in the set that already holds the group's content.
    ///
    /// An entry carrying the bare base name wins over suffixed ones.
    fn satisfying_entry<'e>(
        &self,
        directory: &Path,
        group: &Group<'_>,
        existing: &[&'e ExistingEntry],
    ) -> Result<Option<&'e ExistingEntry>, ResolveError> {
        let base = group.base();
        let entry = existing
            .iter()
            .copied()
            .filter(|e| e.content.as_ref() == Some(group.content))
            .min_by(|a, b| {
                (a.name != base.as_ref())
                    .cmp(&(b.name != base.as_ref()))
                    .then_with(|| a.name.cmp(&b.name))
            });

        if let (Some(entry), Some(verifier)) = (entry, &self.verifier) {
            let occupant = directory.join(&entry.name);
            compare(
                verifier.as_ref(),
                directory,
                group.content,
                &group.selected.path,
                &occupant,
            )?;
        }

        Ok(entry)
    }

    fn verify_members(&self, directory: &Path, group: &Group<'_>) -> Result<(), ResolveError> {
        let Some(verifier) = &self.verifier else {
            return Ok(());
        };
        for member in &group.rest {
            compare(
                verifier.as_ref(),
                directory,
                group.content,
                &group.selected.path,
                &member.path,
            )?;
        }
        Ok(())
    }
}

fn compare(
    verifier: &dyn ContentVerifier,
    directory: &Path,
    key: &ContentId,
    reference: &Path,
    other: &Path,
) -> Result<(), ResolveError> {
    let same = verifier
        .same_content(reference, other)
        .map_err(|source| ResolveError::Verify {
            path: other.to_path_buf(),
            source,
        })?;

    if same {
        Ok(())
    } else {
        log::error!(
            "Content id {} groups {} and {}, but their contents differ",
            key,
            reference.display(),
            other.display()
        );
        Err(ResolveError::Integrity {
            directory: directory.to_path_buf(),
            names: vec![
                reference.display().to_string(),
                other.display().to_string(),
            ],
            key: key.clone(),
        })
    }
}
