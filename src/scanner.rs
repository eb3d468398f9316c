//! Content scanner.
//!
//! Tag-interleaved resources mix literal bytes with script regions:
//!
//! ```text
//! <p>Temperature: <?lua print(adc.read(0)) ?> C</p>
//! ```
//!
//! [`next_span`] splits such a body into literal and script spans, and [`run_script`] executes a
//! script span (or a whole full-page script) against the peer's engine instance, capturing the
//! output in the connection's output buffer.

use core::ops::Range;

use crate::ascii::{find, is_whitespace};
use crate::config::Markers;
use crate::engine::{BufferOverflow, Params, ScriptEngine, ScriptOutput};
use crate::identity::IdentityTable;

/// A region of a tag-interleaved body.  Consecutive spans tile the body without gaps or overlaps.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Span {
    /// Bytes sent to the client as they are
    Literal(Range<usize>),
    /// A marker delimited script region
    Script {
        /// The script source, excluding both markers
        source: Range<usize>,
        /// Offset just past the end marker, or the end of the body if the region is unterminated
        end: usize,
    },
}

impl Span {
    /// Offset of the first byte after this span
    pub fn end(&self) -> usize {
        match self {
            Self::Literal(r) => r.end,
            Self::Script { end, .. } => *end,
        }
    }
}

/// The span starting at `pos`, or `None` once `pos` has reached the end of `body`.
///
/// A literal span runs up to the next start marker.  A script span starts with the start marker,
/// optionally followed by one whitespace byte that is not part of the source, and runs to the end
/// marker.  A start marker without an end marker makes the rest of the body script source.
pub fn next_span(body: &[u8], pos: usize, markers: &Markers) -> Option<Span> {
    let rest = body.get(pos..).filter(|r| !r.is_empty())?;

    if !markers.open.is_empty() && rest.starts_with(markers.open) {
        let mut start = pos + markers.open.len();
        if body.get(start).copied().is_some_and(is_whitespace) {
            start += 1;
        }

        return Some(match find(&body[start..], markers.close) {
            Some(n) => Span::Script {
                source: start..start + n,
                end: start + n + markers.close.len(),
            },
            None => Span::Script {
                source: start..body.len(),
                end: body.len(),
            },
        });
    }

    let literal_end = match find(rest, markers.open) {
        Some(n) => pos + n,
        None => body.len(),
    };

    Some(Span::Literal(pos..literal_end))
}

/// Iterator over every span of a body, see [`next_span`]
pub struct Spans<'a> {
    body: &'a [u8],
    pos: usize,
    markers: Markers,
}

/// Split `body` into its spans
///
/// ```
/// use scriptlite::config::Markers;
/// use scriptlite::scanner::{spans, Span};
///
/// let markers = Markers { open: b"<?start", close: b"<?end>" };
/// let body = b"abc<?start x=1<?end>def";
///
/// let found: Vec<Span> = spans(body, markers).collect();
/// assert_eq!(found, [
///     Span::Literal(0..3),
///     Span::Script { source: 11..14, end: 20 },
///     Span::Literal(20..23),
/// ]);
/// assert_eq!(&body[11..14], b"x=1");
/// ```
pub fn spans(body: &[u8], markers: Markers) -> Spans<'_> {
    Spans {
        body,
        pos: 0,
        markers,
    }
}

impl Iterator for Spans<'_> {
    type Item = Span;

    fn next(&mut self) -> Option<Self::Item> {
        let span = next_span(self.body, self.pos, &self.markers)?;
        self.pos = span.end();
        Some(span)
    }
}

/// Execute `source` with the engine instance of `peer` and capture its output in `output`.
///
/// The peer's slot is resolved again here since eviction may have re-keyed the slot the
/// connection was given when it opened.  An instance evicted by that lookup is destroyed.  When
/// `fresh` is set it is cleared and the peer's existing instance is destroyed first, so the script
/// runs on a brand new interpreter.
///
/// Returns the number of output bytes.  A failing script is logged and yields no output.
/// Output that does not fit is a `BufferOverflow`, in which case the contents of `output` are
/// meaningless.
pub(crate) fn run_script<E, K, const N: usize>(
    engine: &mut E,
    table: &mut IdentityTable<K, E::Instance, N>,
    peer: &K,
    fresh: &mut bool,
    source: &[u8],
    params: &Params<'_>,
    output: &mut [u8],
) -> Result<usize, BufferOverflow>
where
    E: ScriptEngine,
    K: PartialEq + Clone,
{
    let assignment = table.lookup_or_assign(peer);
    let slot = assignment.slot;
    if let Some(evicted) = assignment.evicted {
        debug!("destroying engine instance evicted from slot {}", slot);
        engine.destroy_instance(evicted);
    }

    if core::mem::take(fresh)
        && let Some(old) = table.take_instance(slot)
    {
        trace!("resetting engine instance in slot {}", slot);
        engine.destroy_instance(old);
    }

    if table.instance_mut(slot).is_none() {
        match engine.create_instance() {
            Ok(instance) => {
                if let Some(unused) = table.set_instance(slot, instance) {
                    engine.destroy_instance(unused);
                }
            }
            Err(e) => {
                warn!("unable to create engine instance: {}", e);
                return Ok(0);
            }
        }
    }

    let instance = match table.instance_mut(slot) {
        Some(instance) => instance,
        None => return Ok(0),
    };

    let mut out = ScriptOutput::new(output);
    let res = engine.execute(instance, source, params, &mut out);

    if out.overflowed() {
        return Err(BufferOverflow {
            capacity: out.capacity(),
        });
    }

    match res {
        Ok(()) => Ok(out.len()),
        Err(e) => {
            warn!("script execution failed: {}", e);
            Ok(0)
        }
    }
}
