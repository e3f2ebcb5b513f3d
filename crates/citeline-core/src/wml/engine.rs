use crate::error::Result;
use crate::governor::{Admission, GovernorConfig, MemoryGovernor};
use crate::package::{DocxPackage, SecurityGate, ZipStore};
use crate::types::{
    ChangeKind, ChangeRequest, ChangedEntry, ReferenceEntry, ReplacementSummary,
};
use crate::util::strings::escape_text;
use crate::wml::matcher::{adapt_replacement, find_citation};
use crate::wml::references::{locate_reference_section, rebuild_reference_section};
use crate::wml::renderer::apply_span_edit;
use crate::wml::revision::{RevisionIdAllocator, RevisionSettings};
use crate::wml::segment::TextSegmentIndex;
use crate::wml::selective::{apply_selective_edits, SelectiveEdit};
use crate::wml::settings::EngineSettings;
use tracing::{debug, info, warn};

/// Rewritten package plus the aggregate outcome of the invocation.
#[derive(Debug)]
pub struct EngineOutput {
    pub bytes: Vec<u8>,
    pub summary: ReplacementSummary,
}

/// Top-level orchestrator: validates the package, splits body from
/// references, rewrites citation spans, rebuilds the reference section, and
/// reassembles the package. Reentrant across documents; each invocation owns
/// its working copy of the XML.
pub struct CitationEngine {
    settings: EngineSettings,
    security: SecurityGate,
    governor: MemoryGovernor,
}

impl CitationEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            security: SecurityGate::default(),
            governor: MemoryGovernor::new(GovernorConfig::default()),
        }
    }

    pub fn with_components(
        settings: EngineSettings,
        security: SecurityGate,
        governor: MemoryGovernor,
    ) -> Self {
        Self {
            settings,
            security,
            governor,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn governor(&self) -> &MemoryGovernor {
        &self.governor
    }

    /// Apply a set of citation changes to a package. Fatal conditions
    /// (structure, size, memory, breaker) reject the whole operation with no
    /// partial output; per-citation misses are aggregated into the summary.
    pub fn apply(
        &self,
        package_bytes: &[u8],
        tenant: &str,
        changes: &[ChangeRequest],
        references: &[ReferenceEntry],
    ) -> Result<EngineOutput> {
        let admission = self.governor.admit(package_bytes.len(), tenant)?;
        let result = self.governor.run_tracked("citation-rewrite", || {
            self.process(package_bytes, admission, changes, references)
        });
        if result.is_ok() {
            self.governor.record_success(tenant);
        }
        result
    }

    fn process(
        &self,
        package_bytes: &[u8],
        admission: Admission,
        changes: &[ChangeRequest],
        references: &[ReferenceEntry],
    ) -> Result<EngineOutput> {
        let store = match admission {
            Admission::InMemory => ZipStore::in_memory(package_bytes.to_vec()),
            Admission::SpillToDisk => ZipStore::spooled(package_bytes)?,
        };
        self.security.validate_archive(&store)?;

        let mut package = DocxPackage::new(store);
        let raw_xml = package.document_xml()?;
        let xml = self.security.sanitize_xml(&raw_xml)?;

        let rev = RevisionSettings::new(
            self.settings.author.clone(),
            self.settings.date_time.clone(),
        );
        let mut ids = RevisionIdAllocator::seeded_from(&xml);
        let first_id = ids.current();
        let mut summary = ReplacementSummary::default();

        // The body/reference boundary, once established, is never crossed by
        // in-text replacement logic.
        let section = locate_reference_section(&xml, &self.settings);
        summary.reference_section_found = section.is_some();
        let body_end = section.as_ref().map(|s| s.body_end).unwrap_or(xml.len());
        let mut body = xml[..body_end].to_string();
        let mut ref_region = xml[body_end..].to_string();

        self.apply_intext_changes(&mut body, changes, &mut summary, &mut ids, &rev);
        self.apply_reference_changes(
            &mut ref_region,
            section.is_some(),
            changes,
            references,
            &mut summary,
            &mut ids,
            &rev,
        );

        summary.finalize_orphans();

        let mut out_xml = body;
        out_xml.push_str(&ref_region);

        let emitted_markup = !self.settings.accept_changes && ids.current() > first_id;
        package.set_document_xml(out_xml);
        if emitted_markup {
            package.enable_track_changes()?;
        }

        info!(
            changed = summary.changed.len(),
            orphaned = summary.orphaned.len(),
            reordered = summary.references_reordered,
            deleted = summary.references_deleted,
            "citation rewrite complete"
        );

        Ok(EngineOutput {
            bytes: package.into_bytes()?,
            summary,
        })
    }

    /// Rewrite in-text citation spans inside the body region only.
    fn apply_intext_changes(
        &self,
        body: &mut String,
        changes: &[ChangeRequest],
        summary: &mut ReplacementSummary,
        ids: &mut RevisionIdAllocator,
        rev: &RevisionSettings,
    ) {
        for change in changes.iter().filter(|c| is_intext(c)) {
            let before = change.before_text.as_str();
            let after = change.after_text.as_deref();

            if before.is_empty() || after == Some(before) {
                summary.unchanged += 1;
                continue;
            }

            let mut count = 0usize;
            let mut strategy = None;
            let mut resume = 0usize;

            while count < self.settings.max_replacements_per_change {
                let index = TextSegmentIndex::build(body, &self.settings.scan);
                let Some(found) = find_citation(&index, before, resume) else {
                    break;
                };
                let replacement = after.map(|a| adapt_replacement(found.strategy, a));
                strategy.get_or_insert(found.strategy);

                *body = apply_span_edit(
                    body,
                    &index,
                    found.span.clone(),
                    replacement,
                    change.kind,
                    self.settings.accept_changes,
                    ids,
                    rev,
                    &self.settings.scan,
                );
                resume = found.span.start
                    + replacement.map(|r| escape_text(r).len()).unwrap_or(0);
                count += 1;
            }

            if count > 0 {
                summary.changed.push(ChangedEntry {
                    from: before.to_string(),
                    to: after.unwrap_or("").to_string(),
                    count,
                    strategy: strategy.map(|s| s.as_str().to_string()),
                });
            } else {
                debug!(citation = before, "citation not found in body");
                summary.orphaned.push(before.to_string());
            }
        }
    }

    /// Reference-section work: full rebuild for reorder requests, selective
    /// edits/deletes for the narrow author-year path.
    #[allow(clippy::too_many_arguments)]
    fn apply_reference_changes(
        &self,
        ref_region: &mut String,
        section_found: bool,
        changes: &[ChangeRequest],
        references: &[ReferenceEntry],
        summary: &mut ReplacementSummary,
        ids: &mut RevisionIdAllocator,
        rev: &RevisionSettings,
    ) {
        let reorder_requested = changes
            .iter()
            .any(|c| c.kind == ChangeKind::ReferenceReorder);

        let mut selective_deletes: Vec<String> = Vec::new();
        let mut selective_edits: Vec<SelectiveEdit> = Vec::new();
        for change in changes {
            match change.kind {
                ChangeKind::Delete if !is_intext(change) => {
                    selective_deletes.push(change.before_text.clone());
                }
                ChangeKind::ReferenceSectionEdit => match change.after_text.as_deref() {
                    Some(after) if !after.is_empty() => selective_edits.push(SelectiveEdit {
                        old_text: change.before_text.clone(),
                        new_text: after.to_string(),
                    }),
                    _ => selective_deletes.push(change.before_text.clone()),
                },
                _ => {}
            }
        }

        if !section_found {
            if reorder_requested || !selective_deletes.is_empty() || !selective_edits.is_empty() {
                warn!("no reference section found, skipping reference-section work");
                summary.orphaned.extend(selective_deletes);
                summary
                    .orphaned
                    .extend(selective_edits.into_iter().map(|e| e.old_text));
            }
            return;
        }

        if reorder_requested && !references.is_empty() {
            let (rebuilt, stats) =
                rebuild_reference_section(ref_region, references, &self.settings, ids, rev);
            *ref_region = rebuilt;
            summary.references_reordered = stats.reordered;
            summary.references_deleted += stats.deleted;
            summary.swapped = stats.swapped;
            summary.references_not_found = stats.not_found;
        }

        if !selective_deletes.is_empty() || !selective_edits.is_empty() {
            let (edited, stats) = apply_selective_edits(
                ref_region,
                &selective_deletes,
                &selective_edits,
                &self.settings,
                ids,
                rev,
            );
            *ref_region = edited;
            summary.references_deleted += stats.deleted;
            for edit in &selective_edits {
                if !stats.not_found.contains(&edit.old_text) {
                    summary.changed.push(ChangedEntry {
                        from: edit.old_text.clone(),
                        to: edit.new_text.clone(),
                        count: 1,
                        strategy: None,
                    });
                }
            }
            summary.orphaned.extend(stats.not_found);
        }
    }
}

/// Whether a change targets body text rather than the reference list. A
/// delete carrying a reference id is a reference-entry deletion.
fn is_intext(change: &ChangeRequest) -> bool {
    match change.kind {
        ChangeKind::Renumber | ChangeKind::IntextStyleConversion => true,
        ChangeKind::Delete => change
            .metadata
            .as_ref()
            .map(|m| m.reference_id.is_none())
            .unwrap_or(true),
        ChangeKind::ReferenceSectionEdit | ChangeKind::ReferenceReorder => false,
    }
}
