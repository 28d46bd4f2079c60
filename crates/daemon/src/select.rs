//! Stream selection
//!
//! Picks the streams of a source file that go into the output and resolves
//! the encoding settings of each one.

use crate::config::{EncodingProfile, OutputSettings, StreamKind};
use crate::rules;
use crate::stream::Stream;
use tracing::debug;

/// Build the ordered destination stream list for a source file
///
/// Kinds are processed in the order video, audio, subtitle. For each kind:
/// 1. the first stream in probe order matching any primary criteria becomes primary
/// 2. without a match, video and audio fall back to the last stream of that kind
/// 3. when allowed, every other stream matching any secondary criteria follows
///
/// Every destination stream then starts from pass-through settings and has
/// each matching encoder rule of its kind merged on, in declared order.
pub fn select_streams(source: &[Stream], profile: &EncodingProfile) -> Vec<Stream> {
    let mut destination = Vec::new();

    for kind in StreamKind::ALL {
        let candidates: Vec<&Stream> = source.iter().filter(|s| s.kind == kind).collect();

        let mut primary = profile.selection.primary(kind).and_then(|criteria| {
            candidates
                .iter()
                .copied()
                .find(|stream| criteria.iter().any(|c| rules::matches(c, stream)))
        });

        if primary.is_none() && kind != StreamKind::Subtitle {
            primary = candidates.last().copied();
            if let Some(stream) = primary {
                debug!(kind = %kind, index = stream.index, "No stream passed primary rules, using the last one");
            }
        }

        if let Some(stream) = primary {
            debug!(kind = %kind, index = stream.index, primary = true, "Selected stream");
            destination.push(stream.to_destination(true));
        }

        if let Some(criteria) = profile.selection.secondary(kind) {
            for stream in candidates.iter().copied() {
                if primary.is_some_and(|p| p.index == stream.index) {
                    continue;
                }
                if criteria.iter().any(|c| rules::matches(c, stream)) {
                    debug!(kind = %kind, index = stream.index, primary = false, "Selected stream");
                    destination.push(stream.to_destination(false));
                }
            }
        }
    }

    for stream in &mut destination {
        stream.output = Some(resolve_settings(stream, profile));
        debug!(
            index = stream.index,
            settings = ?stream.output,
            "Resolved encoding settings"
        );
    }

    destination
}

/// Fold the profile's encoder rules onto one destination stream
///
/// Rules see the settings accumulated so far, so a later rule can test a
/// field an earlier one set.
fn resolve_settings(stream: &Stream, profile: &EncodingProfile) -> OutputSettings {
    let mut working = stream.clone();
    let mut settings = OutputSettings::default();
    working.output = Some(settings.clone());

    for rule in profile.encoder.iter().filter(|r| r.kind == stream.kind) {
        if rules::matches(rule, &working) {
            settings.apply(&rule.result);
            working.output = Some(settings.clone());
        }
    }

    settings
}
