//! Per-encounter result cache.
//!
//! `LimbResultCache` accumulates confirmed points for the part under test and freezes them into
//! the `SessionResultCache` when the clinician finalizes the limb.

use std::collections::BTreeMap;

use crate::error::{SessionError, SessionResult};
use crate::models::{AnatomicalPart, LimbResult, PointLevel, MAX_POINTS};

/// In-progress points of one part, bounded by the part's layout.
#[derive(Debug, Clone)]
struct LimbBuffer {
    part: AnatomicalPart,
    points: [Option<PointLevel>; MAX_POINTS],
}

impl LimbBuffer {
    fn new(part: AnatomicalPart) -> Self {
        Self {
            part,
            points: [None; MAX_POINTS],
        }
    }

    fn is_empty(&self) -> bool {
        self.points.iter().all(Option::is_none)
    }

    fn snapshot(&self) -> BTreeMap<usize, PointLevel> {
        self.points
            .iter()
            .enumerate()
            .filter_map(|(index, level)| level.map(|level| (index, level)))
            .collect()
    }
}

/// Frozen limb results of the current encounter. A part is complete iff it is a key here.
#[derive(Debug, Clone, Default)]
pub struct SessionResultCache {
    limbs: BTreeMap<AnatomicalPart, LimbResult>,
}

impl SessionResultCache {
    pub fn get(&self, part: AnatomicalPart) -> Option<&LimbResult> {
        self.limbs.get(&part)
    }

    pub fn contains(&self, part: AnatomicalPart) -> bool {
        self.limbs.contains_key(&part)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AnatomicalPart, &LimbResult)> {
        self.limbs.iter()
    }

    pub fn completed_parts(&self) -> Vec<AnatomicalPart> {
        self.limbs.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.limbs.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        AnatomicalPart::ALL.iter().all(|part| self.contains(*part))
    }

    fn insert(&mut self, result: LimbResult) {
        self.limbs.insert(result.part(), result);
    }

    fn remove(&mut self, part: AnatomicalPart) -> Option<LimbResult> {
        self.limbs.remove(&part)
    }

    fn clear(&mut self) {
        self.limbs.clear();
    }
}

#[derive(Debug, Clone, Default)]
pub struct LimbResultCache {
    active: Option<LimbBuffer>,
    session: SessionResultCache,
}

impl LimbResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) the in-progress buffer for `part`.
    pub fn begin(&mut self, part: AnatomicalPart) {
        self.active = Some(LimbBuffer::new(part));
    }

    pub fn active_part(&self) -> Option<AnatomicalPart> {
        self.active.as_ref().map(|buffer| buffer.part)
    }

    /// Overwrites any previous value at `index`, so a single point can be re-measured.
    pub fn record(&mut self, index: usize, level: PointLevel) -> SessionResult<()> {
        let buffer = self.active.as_mut().ok_or(SessionError::NoActiveLimb)?;
        if !buffer.part.contains_point(index) {
            return Err(SessionError::PointOutOfRange {
                part: buffer.part,
                index,
            });
        }
        if !level.is_confirmed() {
            return Err(SessionError::InvalidLevel(level.value()));
        }
        buffer.points[index] = Some(level);
        Ok(())
    }

    /// Points recorded so far for the part under test.
    pub fn in_progress(&self) -> BTreeMap<usize, PointLevel> {
        self.active
            .as_ref()
            .map(LimbBuffer::snapshot)
            .unwrap_or_default()
    }

    /// Freezes the buffer of `part` into the session cache and clears it.
    ///
    /// Fails with `EmptyResult` when no point was recorded; the buffer is left untouched.
    pub fn finalize_limb(&mut self, part: AnatomicalPart) -> SessionResult<LimbResult> {
        let buffer = match self.active.as_ref() {
            Some(buffer) if buffer.part == part => buffer,
            _ => return Err(SessionError::EmptyResult { part }),
        };
        if buffer.is_empty() {
            return Err(SessionError::EmptyResult { part });
        }

        let result = LimbResult::new(part, buffer.snapshot())?;
        self.active = None;
        self.session.insert(result.clone());
        Ok(result)
    }

    /// Drops the in-progress buffer without freezing anything.
    pub fn abandon_active(&mut self) {
        self.active = None;
    }

    pub fn is_part_complete(&self, part: AnatomicalPart) -> bool {
        self.session.contains(part)
    }

    /// Redo: forgets the frozen result so the whole limb is measured again.
    pub fn remove_part(&mut self, part: AnatomicalPart) -> Option<LimbResult> {
        self.session.remove(part)
    }

    pub fn session(&self) -> &SessionResultCache {
        &self.session
    }

    /// Wipes every limb. Only at the start of a new encounter.
    pub fn clear(&mut self) {
        self.active = None;
        self.session.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(value: u8) -> PointLevel {
        PointLevel::confirmed(value).unwrap()
    }

    #[test]
    fn record_requires_a_limb_under_test() {
        let mut cache = LimbResultCache::new();
        assert_eq!(cache.record(0, level(2)), Err(SessionError::NoActiveLimb));
    }

    #[test]
    fn record_validates_index_against_layout() {
        let mut cache = LimbResultCache::new();
        cache.begin(AnatomicalPart::RightHand);
        assert_eq!(
            cache.record(6, level(2)),
            Err(SessionError::PointOutOfRange {
                part: AnatomicalPart::RightHand,
                index: 6
            })
        );
        assert!(cache.record(5, level(2)).is_ok());
    }

    #[test]
    fn record_overwrites_previous_value() {
        let mut cache = LimbResultCache::new();
        cache.begin(AnatomicalPart::LeftFoot);
        cache.record(3, level(2)).unwrap();
        cache.record(3, level(5)).unwrap();
        assert_eq!(cache.in_progress().get(&3), Some(&level(5)));
    }

    #[test]
    fn finalize_empty_limb_fails_and_keeps_buffer() {
        let mut cache = LimbResultCache::new();
        cache.begin(AnatomicalPart::RightFoot);
        assert_eq!(
            cache.finalize_limb(AnatomicalPart::RightFoot),
            Err(SessionError::EmptyResult {
                part: AnatomicalPart::RightFoot
            })
        );
        assert_eq!(cache.active_part(), Some(AnatomicalPart::RightFoot));
        assert!(!cache.is_part_complete(AnatomicalPart::RightFoot));
    }

    #[test]
    fn finalize_freezes_snapshot_and_clears_buffer() {
        let mut cache = LimbResultCache::new();
        cache.begin(AnatomicalPart::LeftHand);
        cache.record(0, level(2)).unwrap();
        cache.record(1, level(4)).unwrap();

        let result = cache.finalize_limb(AnatomicalPart::LeftHand).unwrap();
        assert_eq!(result.len(), 2);
        assert!(cache.is_part_complete(AnatomicalPart::LeftHand));
        assert_eq!(cache.active_part(), None);
        assert!(cache.in_progress().is_empty());
    }

    #[test]
    fn redo_clears_the_whole_limb() {
        let mut cache = LimbResultCache::new();
        cache.begin(AnatomicalPart::LeftHand);
        cache.record(0, level(2)).unwrap();
        cache.record(1, level(4)).unwrap();
        cache.finalize_limb(AnatomicalPart::LeftHand).unwrap();

        cache.remove_part(AnatomicalPart::LeftHand);
        assert!(!cache.is_part_complete(AnatomicalPart::LeftHand));

        cache.begin(AnatomicalPart::LeftHand);
        cache.record(0, level(6)).unwrap();
        let redone = cache.finalize_limb(AnatomicalPart::LeftHand).unwrap();
        assert_eq!(redone.points(), &BTreeMap::from([(0, level(6))]));
    }

    #[test]
    fn clear_wipes_frozen_and_active_limbs() {
        let mut cache = LimbResultCache::new();
        cache.begin(AnatomicalPart::RightHand);
        cache.record(0, level(1)).unwrap();
        cache.finalize_limb(AnatomicalPart::RightHand).unwrap();
        cache.begin(AnatomicalPart::LeftHand);

        cache.clear();
        assert!(cache.session().is_empty());
        assert_eq!(cache.active_part(), None);
    }

    #[test]
    fn session_is_complete_only_with_all_four_parts() {
        let mut cache = LimbResultCache::new();
        for part in AnatomicalPart::ALL {
            assert!(!cache.session().is_complete());
            cache.begin(part);
            cache.record(0, level(1)).unwrap();
            cache.finalize_limb(part).unwrap();
        }
        assert!(cache.session().is_complete());
    }
}
