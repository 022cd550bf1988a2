//! Construction of the global frame index.
//!
//! Every (source, local frame) pair is placed at a position along the
//! c/z/t/xy axes and at a sequential frame number. The builder state is
//! folded over the descriptor list by a pure function and finalized by a
//! standalone pure function into an ordered frame list; nothing here
//! mutates shared state.
//!
//! The index runs in one of two modes, decided globally:
//!
//! - **axis mode**: the Cartesian product over the occupied axis ranges is
//!   enumerated xy (outermost), then t, then z, then c (innermost), one
//!   [`GlobalFrame`] per combination;
//! - **sequential mode**: frames are plain integers `0..=max`. The index
//!   drops to sequential the first time any multiframe source cannot be
//!   correlated to per-frame axis metadata. This is a whole-index decision,
//!   never a per-source one.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::{Axis, SourceEntry};
use crate::source::provider::SourceMetadata;

// =============================================================================
// Frames and contributions
// =============================================================================

/// The pairing of a source and a local frame supplying pixel data for one
/// global frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceContribution {
    /// Index into the composite's descriptor list.
    pub source_index: usize,
    /// Frame number within that source.
    pub frame: u32,
    /// Opaque per-fetch options forwarded with every sub-region request.
    pub style: Option<serde_json::Value>,
}

/// Position along the four positional axes.
///
/// Field order matches enumeration order: xy outermost, c innermost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AxisKey {
    pub xy: u32,
    pub t: u32,
    pub z: u32,
    pub c: u32,
}

/// One frame of the composite.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalFrame {
    /// Sequential frame id.
    pub frame: u32,
    /// Raster position over the used axes; equals `frame`.
    pub index: u32,
    /// Axis positions, tagged only for axes whose range exceeds one.
    pub index_c: Option<u32>,
    pub index_z: Option<u32>,
    pub index_t: Option<u32>,
    pub index_xy: Option<u32>,
    /// Contributing sources in declared order; later entries draw over
    /// earlier ones.
    pub sources: Vec<SourceContribution>,
}

/// The finished, immutable frame index.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameIndex {
    pub frames: Vec<GlobalFrame>,
    pub channels: Vec<String>,
    /// Whether the index was enumerated over axes rather than sequentially.
    pub axes_mode: bool,
}

impl FrameIndex {
    pub fn frame_count(&self) -> u32 {
        self.frames.len() as u32
    }
}

// =============================================================================
// Builder state
// =============================================================================

/// Accumulated index state, threaded through [`FrameIndexState::add_source`]
/// by value.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameIndexState {
    by_frame: BTreeMap<u32, Vec<SourceContribution>>,
    by_axes: BTreeMap<AxisKey, Vec<SourceContribution>>,
    channels: Vec<String>,
    axes_allowed: bool,
}

impl FrameIndexState {
    /// Fresh state, optionally seeded with configured channel names.
    pub fn new(channels: Vec<String>) -> Self {
        Self {
            by_frame: BTreeMap::new(),
            by_axes: BTreeMap::new(),
            channels,
            axes_allowed: true,
        }
    }

    pub fn axes_allowed(&self) -> bool {
        self.axes_allowed
    }

    /// Place every local frame of one source into the index.
    ///
    /// Consumes and returns the state; the caller folds this over the
    /// descriptor list.
    pub fn add_source(
        mut self,
        source_index: usize,
        entry: &SourceEntry,
        meta: &SourceMetadata,
    ) -> Self {
        let frames = meta.frames.max(1);

        // A multiframe source without a per-frame axis table cannot be
        // correlated; the whole index falls back to sequential mode.
        if frames > 1 && meta.frame_axes.is_none() {
            if self.axes_allowed {
                debug!(
                    source_index,
                    "multiframe source without axis metadata; index falls back to sequential"
                );
            }
            self.axes_allowed = false;
        }

        if !entry.has_axis_config() {
            return self.add_auto_assigned(source_index, entry, frames);
        }

        for local_frame in 0..frames {
            let axes = meta.frame_axes_at(local_frame);
            let contribution = SourceContribution {
                source_index,
                frame: local_frame,
                style: entry.style.clone(),
            };

            let mut c = axis_value(entry, Axis::C, local_frame, axes.index_c as i64);
            if let Some(name) = channel_name(entry, axes.index_c) {
                // A channel name already present in the global list wins
                // over numeric alignment.
                c = self.channel_position(name);
            }
            let z = axis_value(entry, Axis::Z, local_frame, axes.index_z as i64);
            let t = axis_value(entry, Axis::T, local_frame, axes.index_t as i64);
            let xy = axis_value(entry, Axis::XY, local_frame, axes.index_xy as i64);
            let frame_number =
                axis_value(entry, Axis::Frame, local_frame, local_frame as i64);

            self.by_frame
                .entry(clamp_axis(frame_number))
                .or_default()
                .push(contribution.clone());
            self.by_axes
                .entry(AxisKey {
                    xy: clamp_axis(xy),
                    t: clamp_axis(t),
                    z: clamp_axis(z),
                    c: clamp_axis(c),
                })
                .or_default()
                .push(contribution);
        }
        self
    }

    /// Place a source with no axis configuration at the first unused frame
    /// (and z) slot, enabling simple two-source composites without any axis
    /// bookkeeping.
    ///
    /// A declared channel name distinguishes the source along c instead;
    /// its z then runs over the local frames from zero so channel-only
    /// composites stay a flat channel stack.
    fn add_auto_assigned(mut self, source_index: usize, entry: &SourceEntry, frames: u32) -> Self {
        let named = channel_name(entry, 0).is_some();
        let slot = self.first_free_run(frames);
        for local_frame in 0..frames {
            let n = slot + local_frame;
            let mut c = 0;
            if let Some(name) = channel_name(entry, 0) {
                c = self.channel_position(name);
            }
            let contribution = SourceContribution {
                source_index,
                frame: local_frame,
                style: entry.style.clone(),
            };
            self.by_frame.entry(n).or_default().push(contribution.clone());
            self.by_axes
                .entry(AxisKey {
                    xy: 0,
                    t: 0,
                    z: if named { local_frame } else { n },
                    c: clamp_axis(c),
                })
                .or_default()
                .push(contribution);
        }
        self
    }

    /// Smallest `n` with `frames` consecutive unoccupied frame numbers.
    fn first_free_run(&self, frames: u32) -> u32 {
        let mut slot = 0u32;
        'outer: loop {
            for offset in 0..frames {
                if self.by_frame.contains_key(&(slot + offset)) {
                    slot = slot + offset + 1;
                    continue 'outer;
                }
            }
            return slot;
        }
    }

    /// Position of a channel name in the global list, appending it first if
    /// unseen.
    fn channel_position(&mut self, name: &str) -> i64 {
        match self.channels.iter().position(|c| c == name) {
            Some(pos) => pos as i64,
            None => {
                self.channels.push(name.to_string());
                (self.channels.len() - 1) as i64
            }
        }
    }
}

/// Channel name an entry declares for a local channel index, if any.
fn channel_name(entry: &SourceEntry, index_c: u32) -> Option<&str> {
    if let Some(channels) = &entry.channels {
        return channels.get(index_c as usize).map(String::as_str);
    }
    entry.channel.as_deref()
}

/// Resolve one axis value for a local frame.
///
/// Precedence: `<axis>Set` literal, then `<axis>Values` (broadcast a single
/// value plus the flat offset, index two or more directly and linearly
/// extrapolate past the end), then the local per-frame index plus the flat
/// offset.
fn axis_value(entry: &SourceEntry, axis: Axis, local_frame: u32, local_index: i64) -> i64 {
    if let Some(value) = entry.axis_set(axis) {
        return value;
    }
    if let Some(values) = entry.axis_values(axis).filter(|v| !v.is_empty()) {
        let offset = entry.axis_offset(axis).unwrap_or(0);
        return match values.len() {
            1 => values[0] + offset,
            n => {
                let i = local_frame as usize;
                if i < n {
                    values[i]
                } else {
                    // Extrapolate with the stride of the last two values.
                    let stride = values[n - 1] - values[n - 2];
                    values[n - 1] + stride * (i as i64 - (n as i64 - 1))
                }
            }
        };
    }
    local_index + entry.axis_offset(axis).unwrap_or(0)
}

fn clamp_axis(value: i64) -> u32 {
    value.clamp(0, u32::MAX as i64) as u32
}

// =============================================================================
// Finalization
// =============================================================================

/// Turn accumulated state into the ordered frame list.
///
/// Axis mode enumerates the Cartesian product xy, t, z, c with c changing
/// fastest, tagging only axes whose range exceeds one. Sequential mode
/// enumerates plain integers up to the highest used frame number. Either
/// way at least one frame exists.
pub fn finalize(state: FrameIndexState) -> FrameIndex {
    if state.axes_allowed && !state.by_axes.is_empty() {
        let c_range = state.by_axes.keys().map(|k| k.c).max().unwrap_or(0) + 1;
        let z_range = state.by_axes.keys().map(|k| k.z).max().unwrap_or(0) + 1;
        let t_range = state.by_axes.keys().map(|k| k.t).max().unwrap_or(0) + 1;
        let xy_range = state.by_axes.keys().map(|k| k.xy).max().unwrap_or(0) + 1;

        let mut frames = Vec::with_capacity((c_range * z_range * t_range * xy_range) as usize);
        let mut number = 0u32;
        for xy in 0..xy_range {
            for t in 0..t_range {
                for z in 0..z_range {
                    for c in 0..c_range {
                        let key = AxisKey { xy, t, z, c };
                        frames.push(GlobalFrame {
                            frame: number,
                            index: number,
                            index_c: (c_range > 1).then_some(c),
                            index_z: (z_range > 1).then_some(z),
                            index_t: (t_range > 1).then_some(t),
                            index_xy: (xy_range > 1).then_some(xy),
                            sources: state.by_axes.get(&key).cloned().unwrap_or_default(),
                        });
                        number += 1;
                    }
                }
            }
        }
        FrameIndex {
            frames,
            channels: state.channels,
            axes_mode: true,
        }
    } else {
        let max_frame = state.by_frame.keys().max().copied().unwrap_or(0);
        let frames = (0..=max_frame)
            .map(|n| GlobalFrame {
                frame: n,
                index: n,
                index_c: None,
                index_z: None,
                index_t: None,
                index_xy: None,
                sources: state.by_frame.get(&n).cloned().unwrap_or_default(),
            })
            .collect();
        FrameIndex {
            frames,
            channels: state.channels,
            axes_mode: false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
