//! Ordered queue of constant-acceleration move segments.
//!
//! Segments are appended by the planner with strictly non-overlapping
//! time ranges. Gaps between segments are filled with stationary hold
//! segments so every instant between the queue head and tail is covered
//! exactly once. Storage is allocated once at construction; the queue
//! never grows past its configured capacity.

use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, fmt};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueueError {
    #[error("segment starting at {start_time} overlaps queue tail ending at {tail_time}")]
    Ordering { start_time: f64, tail_time: f64 },
    #[error("no segment covers time {time}")]
    NotFound { time: f64 },
    #[error("move queue is full (capacity {capacity})")]
    Full { capacity: usize },
    #[error("invalid segment: {reason}")]
    InvalidSegment { reason: &'static str },
}

pub type Result<T, E = QueueError> = std::result::Result<T, E>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coord {
    pub const ZERO: Coord = Coord::new(0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(&self, other: &Coord) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn scale(&self, k: f64) -> Coord {
        Coord::new(self.x * k, self.y * k, self.z * k)
    }

    pub fn add(&self, other: &Coord) -> Coord {
        Coord::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(&self, other: &Coord) -> Coord {
        Coord::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn length(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<[f64; 3]> for Coord {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Coord::new(x, y, z)
    }
}

impl From<Coord> for [f64; 3] {
    fn from(c: Coord) -> Self {
        [c.x, c.y, c.z]
    }
}

/// One continuous motion description valid over `[start_time, start_time + duration]`.
///
/// Position at move time `t` (seconds since `start_time`) is
/// `start_pos + start_v * t + accel * t^2 / 2` on every axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveSegment {
    pub start_time: f64,
    pub duration: f64,
    pub start_pos: Coord,
    pub start_v: Coord,
    #[serde(default)]
    pub accel: Coord,
}

impl MoveSegment {
    pub fn new(start_time: f64, duration: f64, start_pos: Coord, start_v: Coord, accel: Coord) -> Self {
        Self {
            start_time,
            duration,
            start_pos,
            start_v,
            accel,
        }
    }

    /// A stationary segment holding `pos`.
    pub fn hold(start_time: f64, duration: f64, pos: Coord) -> Self {
        Self::new(start_time, duration, pos, Coord::ZERO, Coord::ZERO)
    }

    /// Constant-acceleration straight line from `start_pos` to `end_pos`,
    /// with path speed ramping from `start_speed` to `end_speed`.
    pub fn between(
        start_time: f64,
        end_time: f64,
        start_pos: Coord,
        end_pos: Coord,
        start_speed: f64,
        end_speed: f64,
    ) -> Self {
        let duration = end_time - start_time;
        let delta = end_pos.sub(&start_pos);
        let distance = delta.length();
        if distance == 0.0 || duration <= 0.0 {
            return Self::hold(start_time, duration, start_pos);
        }
        let axes_r = delta.scale(1.0 / distance);
        let accel = (end_speed - start_speed) / duration;
        Self::new(
            start_time,
            duration,
            start_pos,
            axes_r.scale(start_speed),
            axes_r.scale(accel),
        )
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    pub fn coord_at(&self, move_time: f64) -> Coord {
        let half_t2 = 0.5 * move_time * move_time;
        Coord {
            x: self.start_pos.x + self.start_v.x * move_time + self.accel.x * half_t2,
            y: self.start_pos.y + self.start_v.y * move_time + self.accel.y * half_t2,
            z: self.start_pos.z + self.start_v.z * move_time + self.accel.z * half_t2,
        }
    }

    pub fn velocity_at(&self, move_time: f64) -> Coord {
        self.start_v.add(&self.accel.scale(move_time))
    }

    pub fn end_pos(&self) -> Coord {
        self.coord_at(self.duration)
    }

    pub fn is_stationary(&self) -> bool {
        self.start_v == Coord::ZERO && self.accel == Coord::ZERO
    }

    fn validate(&self) -> Result<()> {
        if !self.start_time.is_finite() || !self.duration.is_finite() {
            return Err(QueueError::InvalidSegment {
                reason: "non-finite timing",
            });
        }
        if self.duration <= 0.0 {
            return Err(QueueError::InvalidSegment {
                reason: "duration must be positive",
            });
        }
        if !self.start_pos.is_finite() || !self.start_v.is_finite() || !self.accel.is_finite() {
            return Err(QueueError::InvalidSegment {
                reason: "non-finite motion terms",
            });
        }
        Ok(())
    }
}

/// Stable handle to a queued segment. Ids are never reused, so a handle
/// to a discarded segment stays detectably dead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(u64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    id: SegmentId,
    segment: MoveSegment,
}

// End of the most recently appended motion; survives trimming so later
// appends can still be ordered and gap-filled against it.
#[derive(Clone, Copy, Debug)]
struct Tail {
    time: f64,
    pos: Coord,
}

pub struct MoveQueue {
    entries: VecDeque<Entry>,
    capacity: usize,
    next_id: u64,
    tail: Option<Tail>,
}

impl MoveQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 0,
            tail: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.entries.len()
    }

    /// Start of the oldest retained segment.
    pub fn start_time(&self) -> Option<f64> {
        self.entries.front().map(|e| e.segment.start_time)
    }

    /// End of the newest appended motion, retained even after trimming.
    pub fn end_time(&self) -> Option<f64> {
        self.tail.map(|t| t.time)
    }

    pub fn segments(&self) -> impl Iterator<Item = (SegmentId, &MoveSegment)> {
        self.entries.iter().map(|e| (e.id, &e.segment))
    }

    fn push(&mut self, segment: MoveSegment) -> SegmentId {
        let id = SegmentId(self.next_id);
        self.next_id += 1;
        self.entries.push_back(Entry { id, segment });
        self.tail = Some(Tail {
            time: segment.end_time(),
            pos: segment.end_pos(),
        });
        id
    }

    /// Append a planner segment, inserting a hold segment if it leaves a gap.
    pub fn append(&mut self, segment: MoveSegment) -> Result<SegmentId> {
        segment.validate()?;
        let gap = match self.tail {
            Some(tail) if segment.start_time < tail.time => {
                return Err(QueueError::Ordering {
                    start_time: segment.start_time,
                    tail_time: tail.time,
                });
            }
            Some(tail) if segment.start_time > tail.time => Some(tail.time),
            _ => None,
        };
        let needed = 1 + gap.is_some() as usize;
        if self.remaining() < needed {
            return Err(QueueError::Full {
                capacity: self.capacity,
            });
        }
        if let Some(gap_start) = gap {
            self.push(MoveSegment::hold(
                gap_start,
                segment.start_time - gap_start,
                segment.start_pos,
            ));
        }
        Ok(self.push(segment))
    }

    /// Split a trapezoidal move along unit direction `axes_r` into its
    /// accel, cruise and decel segments.
    #[allow(clippy::too_many_arguments)]
    pub fn append_trapezoid(
        &mut self,
        start_time: f64,
        accel_t: f64,
        cruise_t: f64,
        decel_t: f64,
        start_pos: Coord,
        axes_r: Coord,
        start_v: f64,
        cruise_v: f64,
        accel: f64,
    ) -> Result<()> {
        let phases = [accel_t, cruise_t, decel_t]
            .iter()
            .filter(|t| **t > 0.0)
            .count();
        if self.remaining() < phases + 1 {
            return Err(QueueError::Full {
                capacity: self.capacity,
            });
        }

        let mut cur_time = start_time;
        let mut cur_pos = start_pos;
        let phases = [
            (accel_t, start_v, accel),
            (cruise_t, cruise_v, 0.0),
            (decel_t, cruise_v, -accel),
        ];
        for (move_t, v, a) in phases {
            if move_t <= 0.0 {
                continue;
            }
            let m = MoveSegment::new(cur_time, move_t, cur_pos, axes_r.scale(v), axes_r.scale(a));
            self.append(m)?;
            cur_time += move_t;
            cur_pos = m.end_pos();
        }
        Ok(())
    }

    fn index_of(&self, id: SegmentId) -> Option<usize> {
        self.entries.binary_search_by_key(&id, |e| e.id).ok()
    }

    pub fn get(&self, id: SegmentId) -> Option<&MoveSegment> {
        self.index_of(id).map(|i| &self.entries[i].segment)
    }

    pub fn next_after(&self, id: SegmentId) -> Option<(SegmentId, &MoveSegment)> {
        let e = self.entries.get(self.index_of(id)? + 1)?;
        Some((e.id, &e.segment))
    }

    /// Locate the segment covering `time`. Segments cover `[start, end)`,
    /// except the last which also covers its end instant.
    pub fn find_segment(&self, time: f64) -> Result<(SegmentId, &MoveSegment)> {
        let not_found = QueueError::NotFound { time };
        let first = self.entries.front().ok_or(not_found.clone())?;
        if !(time >= first.segment.start_time) {
            return Err(not_found);
        }
        let idx = self
            .entries
            .partition_point(|e| e.segment.end_time() <= time);
        let e = match self.entries.get(idx) {
            Some(e) => e,
            None => {
                let last = self.entries.back().ok_or(not_found.clone())?;
                if time > last.segment.end_time() {
                    return Err(not_found);
                }
                last
            }
        };
        Ok((e.id, &e.segment))
    }

    /// Discard segments that end at or before `before_time`.
    pub fn trim(&mut self, before_time: f64) -> usize {
        let mut count = 0;
        while let Some(front) = self.entries.front() {
            if front.segment.end_time() > before_time {
                break;
            }
            self.entries.pop_front();
            count += 1;
        }
        count
    }

    /// Discard all motion after `cutoff`. The segment straddling the
    /// cutoff is shortened; segments starting at or after it are dropped.
    pub fn flush(&mut self, cutoff: f64) -> usize {
        let mut count = 0;
        let mut earliest_dropped = None;
        while let Some(back) = self.entries.back() {
            if back.segment.start_time < cutoff {
                break;
            }
            earliest_dropped = Some(back.segment);
            self.entries.pop_back();
            count += 1;
        }

        match self.entries.back_mut() {
            Some(back) => {
                if back.segment.end_time() > cutoff {
                    back.segment.duration = cutoff - back.segment.start_time;
                }
                self.tail = Some(Tail {
                    time: back.segment.end_time(),
                    pos: back.segment.end_pos(),
                });
            }
            None => {
                if let Some(m) = earliest_dropped {
                    self.tail = Some(Tail {
                        time: m.start_time,
                        pos: m.start_pos,
                    });
                }
            }
        }
        count
    }

    /// Declare the toolhead to be at `pos` from `time` on, discarding any
    /// motion queued past it.
    pub fn set_position(&mut self, time: f64, pos: Coord) -> Result<()> {
        self.flush(time);
        if let Some(tail) = self.tail
            && !self.entries.is_empty()
            && tail.time < time
        {
            if self.remaining() == 0 {
                return Err(QueueError::Full {
                    capacity: self.capacity,
                });
            }
            self.push(MoveSegment::hold(tail.time, time - tail.time, tail.pos));
        }
        self.tail = Some(Tail { time, pos });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cruise(start_time: f64, duration: f64, x: f64, vx: f64) -> MoveSegment {
        MoveSegment::new(
            start_time,
            duration,
            Coord::new(x, 0.0, 0.0),
            Coord::new(vx, 0.0, 0.0),
            Coord::ZERO,
        )
    }

    #[test]
    fn coord_follows_quadratic_profile() {
        let m = MoveSegment::new(
            1.0,
            2.0,
            Coord::new(1.0, 2.0, 3.0),
            Coord::new(1.0, 0.0, -1.0),
            Coord::new(2.0, 4.0, 0.0),
        );
        let c = m.coord_at(1.0);
        assert_eq!(c, Coord::new(3.0, 4.0, 2.0));
        assert_eq!(m.velocity_at(1.0), Coord::new(3.0, 4.0, -1.0));
        assert_eq!(m.end_time(), 3.0);
    }

    #[test]
    fn between_reaches_end_position() {
        let m = MoveSegment::between(
            0.0,
            2.0,
            Coord::ZERO,
            Coord::new(3.0, 4.0, 0.0),
            0.0,
            5.0,
        );
        let end = m.end_pos();
        assert!((end.x - 3.0).abs() < 1e-12);
        assert!((end.y - 4.0).abs() < 1e-12);
        assert_eq!(m.start_v, Coord::ZERO);
        assert!((m.velocity_at(2.0).length() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_overlapping_segment() {
        let mut q = MoveQueue::with_capacity(8);
        q.append(cruise(0.0, 1.0, 0.0, 1.0)).unwrap();
        let err = q.append(cruise(0.5, 1.0, 0.5, 1.0)).unwrap_err();
        assert_eq!(
            err,
            QueueError::Ordering {
                start_time: 0.5,
                tail_time: 1.0
            }
        );
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn rejects_invalid_segment() {
        let mut q = MoveQueue::with_capacity(8);
        assert!(matches!(
            q.append(cruise(0.0, 0.0, 0.0, 1.0)),
            Err(QueueError::InvalidSegment { .. })
        ));
        assert!(matches!(
            q.append(cruise(f64::NAN, 1.0, 0.0, 1.0)),
            Err(QueueError::InvalidSegment { .. })
        ));
    }

    #[test]
    fn inserts_hold_for_gap() {
        let mut q = MoveQueue::with_capacity(8);
        q.append(cruise(0.0, 0.5, 0.0, 2.0)).unwrap();
        q.append(cruise(2.0, 0.5, 1.0, 2.0)).unwrap();
        assert_eq!(q.len(), 3);

        let (_, hold) = q.find_segment(1.0).unwrap();
        assert!(hold.is_stationary());
        assert_eq!(hold.start_time, 0.5);
        assert_eq!(hold.duration, 1.5);
        assert_eq!(hold.start_pos.x, 1.0);
    }

    #[test]
    fn full_queue_rejects_append() {
        let mut q = MoveQueue::with_capacity(2);
        q.append(cruise(0.0, 1.0, 0.0, 1.0)).unwrap();
        // needs a hold plus the segment
        assert_eq!(
            q.append(cruise(2.0, 1.0, 1.0, 1.0)),
            Err(QueueError::Full { capacity: 2 })
        );
        q.append(cruise(1.0, 1.0, 1.0, 1.0)).unwrap();
        assert_eq!(q.remaining(), 0);
    }

    #[test]
    fn find_segment_uses_half_open_ranges() {
        let mut q = MoveQueue::with_capacity(8);
        let a = q.append(cruise(0.0, 1.0, 0.0, 1.0)).unwrap();
        let b = q.append(cruise(1.0, 1.0, 1.0, 1.0)).unwrap();

        assert_eq!(q.find_segment(0.0).unwrap().0, a);
        assert_eq!(q.find_segment(0.999).unwrap().0, a);
        assert_eq!(q.find_segment(1.0).unwrap().0, b);
        assert_eq!(q.find_segment(2.0).unwrap().0, b);
        assert_eq!(
            q.find_segment(-0.1).unwrap_err(),
            QueueError::NotFound { time: -0.1 }
        );
        assert!(q.find_segment(2.1).is_err());
        assert!(q.find_segment(f64::NAN).is_err());
    }

    #[test]
    fn trim_discards_consumed_segments() {
        let mut q = MoveQueue::with_capacity(8);
        let a = q.append(cruise(0.0, 1.0, 0.0, 1.0)).unwrap();
        let b = q.append(cruise(1.0, 1.0, 1.0, 1.0)).unwrap();
        assert_eq!(q.trim(0.5), 0);
        assert_eq!(q.trim(1.0), 1);
        assert!(q.get(a).is_none());
        assert!(q.get(b).is_some());
        assert_eq!(q.start_time(), Some(1.0));

        assert_eq!(q.trim(5.0), 1);
        assert!(q.is_empty());
        // tail survives so ordering is still enforced
        assert_eq!(q.end_time(), Some(2.0));
        assert!(q.append(cruise(1.5, 1.0, 0.0, 1.0)).is_err());
    }

    #[test]
    fn next_after_walks_forward() {
        let mut q = MoveQueue::with_capacity(8);
        let a = q.append(cruise(0.0, 1.0, 0.0, 1.0)).unwrap();
        let b = q.append(cruise(1.0, 1.0, 1.0, 1.0)).unwrap();
        assert_eq!(q.next_after(a).map(|(id, _)| id), Some(b));
        assert!(q.next_after(b).is_none());
    }

    #[test]
    fn flush_truncates_tail_and_never_reuses_ids() {
        let mut q = MoveQueue::with_capacity(8);
        let a = q.append(cruise(0.0, 1.0, 0.0, 1.0)).unwrap();
        let b = q.append(cruise(1.0, 1.0, 1.0, 1.0)).unwrap();

        assert_eq!(q.flush(0.5), 1);
        assert!(q.get(b).is_none());
        let seg = q.get(a).unwrap();
        assert_eq!(seg.duration, 0.5);
        assert_eq!(q.end_time(), Some(0.5));

        let c = q.append(cruise(0.5, 1.0, 0.5, 1.0)).unwrap();
        assert_ne!(c, b);
        assert!(c > b);
    }

    #[test]
    fn flush_everything_keeps_earliest_position() {
        let mut q = MoveQueue::with_capacity(8);
        q.append(cruise(1.0, 1.0, 3.0, 1.0)).unwrap();
        assert_eq!(q.flush(0.0), 1);
        assert!(q.is_empty());
        assert_eq!(q.end_time(), Some(1.0));
    }

    #[test]
    fn set_position_fills_to_new_origin() {
        let mut q = MoveQueue::with_capacity(8);
        q.append(cruise(0.0, 1.0, 0.0, 1.0)).unwrap();
        q.set_position(1.5, Coord::new(10.0, 0.0, 0.0)).unwrap();
        assert_eq!(q.end_time(), Some(1.5));

        q.append(cruise(2.0, 1.0, 10.0, 1.0)).unwrap();
        let (_, hold) = q.find_segment(1.75).unwrap();
        assert!(hold.is_stationary());
        assert_eq!(hold.start_pos.x, 10.0);
        let (_, old) = q.find_segment(1.25).unwrap();
        assert_eq!(old.start_pos.x, 1.0);
    }

    #[test]
    fn trapezoid_splits_into_phases() {
        let mut q = MoveQueue::with_capacity(8);
        q.append_trapezoid(
            0.0,
            0.5,
            1.0,
            0.5,
            Coord::ZERO,
            Coord::new(1.0, 0.0, 0.0),
            0.0,
            10.0,
            20.0,
        )
        .unwrap();
        assert_eq!(q.len(), 3);
        let segments: Vec<_> = q.segments().map(|(_, m)| *m).collect();
        assert_eq!(segments[1].start_pos.x, 2.5);
        assert_eq!(segments[2].start_pos.x, 12.5);
        assert_eq!(segments[2].end_pos().x, 15.0);
        assert_eq!(q.end_time(), Some(2.0));
    }

    #[test]
    fn segment_serde_uses_arrays() {
        let json = r#"{"start_time":0.0,"duration":1.0,"start_pos":[1.0,2.0,3.0],"start_v":[10.0,0.0,0.0]}"#;
        let m: MoveSegment = serde_json::from_str(json).unwrap();
        assert_eq!(m.start_pos, Coord::new(1.0, 2.0, 3.0));
        assert_eq!(m.accel, Coord::ZERO);
    }
}
