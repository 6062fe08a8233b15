//! Confidence propagation.
//!
//! Three steps per group:
//! 1. entity confidence scores each member's candidates on the features
//!    whose related entities are already resolved
//! 2. group candidate formation enumerates every combination of surviving
//!    member candidates
//! 3. group confidence scores the features deferred in step 1 against the
//!    candidates each combination binds
//!
//! A feature attribute is classified by its unmatched targets:
//!
//! | Unmatched targets               | Entity step             | Group step     |
//! |---------------------------------|-------------------------|----------------|
//! | none                            | evaluated               | -              |
//! | outside the group, essential    | every candidate vetoed  | -              |
//! | outside the group, not essential| left unset              | -              |
//! | inside the group only           | deferred                | evaluated      |

use crate::attribute::Attribute;
use crate::board::Board;
use crate::candidate::{GroupCandidate, Score};
use crate::feature::FeatureRegistry;
use crate::group::Group;
use crate::primitives::{FULL_CONFIDENCE, MAX_GROUP_CANDIDATES, SCORE_URGENT};
use crate::worker::Worker;
use crate::workers::{
    ENTITY_CONFIDENCE, GROUP_CANDIDATES, GROUP_CONFIDENCE, entity_message, group_message,
    is_entity_processed, is_member_settled, last_record_is, open_group, recorded_since_selection,
};
use crate::{AgoraError, Region, WorkerKind};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Ready,
    Blocked,
    Deferred,
}

fn readiness(board: &Board, group: Option<&Group>, attribute: &Attribute) -> Result<Readiness, AgoraError> {
    let mut inside = false;
    let mut outside = false;
    for target in attribute.targets() {
        if board.entity(target)?.is_matched() {
            continue;
        }
        if group.is_some_and(|g| g.contains(target)) {
            inside = true;
        } else {
            outside = true;
        }
    }
    Ok(if outside {
        Readiness::Blocked
    } else if inside {
        Readiness::Deferred
    } else {
        Readiness::Ready
    })
}

/// What entity confidence did with each feature attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoringTally {
    pub evaluated: usize,
    pub vetoed: usize,
    pub skipped: usize,
    pub deferred: usize,
}

// =============================================================================
// ENTITY CONFIDENCE
// =============================================================================

/// Score `entity`'s candidates on every feature that can be evaluated now.
pub fn score_entity(
    board: &mut Board,
    features: &FeatureRegistry,
    entity: usize,
) -> Result<ScoringTally, AgoraError> {
    let group = board.find_group_of(entity);
    let mut tally = ScoringTally::default();
    let mut updates: Vec<(usize, usize, Score)> = Vec::new();

    {
        let owner = board.entity(entity)?;
        let group = group.map(|g| board.group(g)).transpose()?;

        for (slot, attribute) in owner.attributes().iter().enumerate() {
            let Some(spec) = attribute.feature() else {
                continue;
            };
            match readiness(board, group, attribute)? {
                Readiness::Ready => {
                    let mut related: Vec<&Region> = Vec::new();
                    for target in attribute.targets() {
                        if let Some(region) = board.entity(target)?.matched_result() {
                            related.push(region);
                        }
                    }
                    for (index, candidate) in owner.candidates().iter().enumerate() {
                        let score = features.score(spec, candidate.region(), &related)?;
                        updates.push((index, slot, score));
                    }
                    tally.evaluated += 1;
                }
                Readiness::Blocked if attribute.is_essential() => {
                    for index in 0..owner.num_candidates() {
                        updates.push((index, slot, Score::vetoed()));
                    }
                    tally.vetoed += 1;
                }
                Readiness::Blocked => tally.skipped += 1,
                Readiness::Deferred => tally.deferred += 1,
            }
        }
    }

    let owner = board.entity_mut(entity)?;
    for (index, slot, score) in updates {
        owner.candidate_mut(index)?.set_score(slot, score)?;
    }
    tracing::debug!(
        entity = owner.name(),
        candidates = owner.num_candidates(),
        evaluated = tally.evaluated,
        vetoed = tally.vetoed,
        skipped = tally.skipped,
        deferred = tally.deferred,
        "entity confidence computed"
    );
    Ok(tally)
}

/// Scores the current entity right after it was segmented.
#[derive(Debug)]
pub struct EntityConfidenceWorker {
    features: Rc<FeatureRegistry>,
}

impl EntityConfidenceWorker {
    #[must_use]
    pub fn new(features: Rc<FeatureRegistry>) -> Self {
        Self { features }
    }
}

impl Worker for EntityConfidenceWorker {
    fn name(&self) -> &str {
        ENTITY_CONFIDENCE
    }

    fn kind(&self) -> WorkerKind {
        WorkerKind::Confidence
    }

    fn score(&self, board: &Board) -> Result<f64, AgoraError> {
        let (Some(_), Some(entity)) = (open_group(board), board.next_entity()) else {
            return Ok(0.0);
        };
        let segmented = board
            .last_record()
            .is_some_and(|r| r.kind() == WorkerKind::Segmentation);
        if !segmented || is_entity_processed(board, entity) || board.entity(entity)?.is_matched() {
            return Ok(0.0);
        }
        Ok(SCORE_URGENT)
    }

    fn activate(&mut self, board: &mut Board) -> Result<(), AgoraError> {
        if let Some(entity) = board.next_entity() {
            score_entity(board, &self.features, entity)?;
        }
        Ok(())
    }

    fn on_activation_recorded(&self, board: &mut Board) -> Result<(), AgoraError> {
        match board.next_entity() {
            Some(entity) => board.append_message_to_last(entity_message(entity)),
            None => Ok(()),
        }
    }
}

// =============================================================================
// GROUP CANDIDATE FORMATION
// =============================================================================

/// Step a mixed-radix counter, last digit fastest. `false` once it wraps.
fn advance(digits: &mut [usize], radices: &[usize]) -> bool {
    for (digit, &radix) in digits.iter_mut().zip(radices).rev() {
        *digit += 1;
        if *digit < radix {
            return true;
        }
        *digit = 0;
    }
    false
}

/// Replace `group`'s group candidates with the cross product of its unmatched
/// members' live candidates (`partial_confidence > 0`).
///
/// Matched members stay unbound. The result has exactly the product of the
/// per-member counts, so it is empty when any unmatched member has no live
/// candidate. Returns that count.
///
/// # Errors
///
/// `InvalidModel` when the product exceeds `MAX_GROUP_CANDIDATES`.
pub fn form_group_candidates(board: &mut Board, group: usize) -> Result<usize, AgoraError> {
    let members = board.group(group)?.members().to_vec();

    let mut axes: Vec<(usize, Vec<(usize, f64)>)> = Vec::new();
    for (position, &member) in members.iter().enumerate() {
        let entity = board.entity(member)?;
        if entity.is_matched() {
            continue;
        }
        let live = entity
            .candidates()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.partial_confidence() > 0.0)
            .map(|(index, c)| (index, c.partial_confidence()))
            .collect();
        axes.push((position, live));
    }

    let radices: Vec<usize> = axes.iter().map(|(_, live)| live.len()).collect();
    let total = radices
        .iter()
        .try_fold(1usize, |acc, &k| acc.checked_mul(k))
        .filter(|&t| t <= MAX_GROUP_CANDIDATES)
        .ok_or_else(|| {
            AgoraError::InvalidModel(format!(
                "group {group} would enumerate more than {MAX_GROUP_CANDIDATES} candidates ({radices:?})"
            ))
        })?;

    let mut formed = Vec::with_capacity(total);
    if total > 0 {
        let mut digits = vec![0usize; axes.len()];
        loop {
            let mut candidate = GroupCandidate::new(members.len());
            for ((position, live), &digit) in axes.iter().zip(&digits) {
                if let Some(&(index, confidence)) = live.get(digit) {
                    candidate.bind(*position, index, confidence)?;
                }
            }
            formed.push(candidate);
            if !advance(&mut digits, &radices) {
                break;
            }
        }
    }

    let count = formed.len();
    board.group_mut(group)?.set_candidates(formed);
    tracing::debug!(group, count, "group candidates formed");
    Ok(count)
}

/// Forms group candidates once every member of the open group is settled.
#[derive(Debug, Default)]
pub struct GroupCandidatesWorker {
    last_group: Option<usize>,
}

impl GroupCandidatesWorker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Worker for GroupCandidatesWorker {
    fn name(&self) -> &str {
        GROUP_CANDIDATES
    }

    fn kind(&self) -> WorkerKind {
        WorkerKind::Confidence
    }

    fn score(&self, board: &Board) -> Result<f64, AgoraError> {
        let Some((_, group)) = open_group(board) else {
            return Ok(0.0);
        };
        if !group.members().iter().all(|&m| is_member_settled(board, m)) {
            return Ok(0.0);
        }
        if recorded_since_selection(board, GROUP_CANDIDATES, WorkerKind::Confidence, None) {
            return Ok(0.0);
        }
        Ok(SCORE_URGENT)
    }

    fn activate(&mut self, board: &mut Board) -> Result<(), AgoraError> {
        self.last_group = open_group(board).map(|(index, _)| index);
        if let Some(group) = self.last_group {
            form_group_candidates(board, group)?;
        }
        Ok(())
    }

    fn on_activation_recorded(&self, board: &mut Board) -> Result<(), AgoraError> {
        match self.last_group {
            Some(group) => board.append_message_to_last(group_message(group)),
            None => Ok(()),
        }
    }
}

// =============================================================================
// GROUP CONFIDENCE
// =============================================================================

/// Regions for `attribute`'s targets as seen by one group candidate: the
/// bound candidate for members, the matched result otherwise. `None` when a
/// target has neither.
fn related_regions<'a>(
    board: &'a Board,
    group: &Group,
    candidate: &GroupCandidate,
    attribute: &Attribute,
) -> Result<Option<Vec<&'a Region>>, AgoraError> {
    let mut regions = Vec::new();
    for target in attribute.targets() {
        let entity = board.entity(target)?;
        let bound = match group.position_of(target) {
            Some(position) => candidate.choice(position)?,
            None => None,
        };
        let region = match bound {
            Some(index) => Some(entity.candidate(index)?.region()),
            None => entity.matched_result(),
        };
        match region {
            Some(region) => regions.push(region),
            None => return Ok(None),
        }
    }
    Ok(Some(regions))
}

/// Evaluate the deferred features of `group`'s members against every group
/// candidate and fold the results into its confidence with `min`.
///
/// An essential attribute whose target cannot be resolved forces the group
/// candidate to 0. Returns the number of deferred attributes.
pub fn score_group_candidates(
    board: &mut Board,
    features: &FeatureRegistry,
    group: usize,
) -> Result<usize, AgoraError> {
    let mut lowered: Vec<f64> = Vec::new();
    let deferred_count;

    {
        let current = board.group(group)?;
        let mut deferred: Vec<(usize, usize, &Attribute)> = Vec::new();
        for (position, &member) in current.members().iter().enumerate() {
            let entity = board.entity(member)?;
            if entity.is_matched() {
                continue;
            }
            for attribute in entity.attributes() {
                if attribute.feature().is_some()
                    && readiness(board, Some(current), attribute)? == Readiness::Deferred
                {
                    deferred.push((position, member, attribute));
                }
            }
        }
        deferred_count = deferred.len();

        for candidate in current.candidates() {
            let mut confidence = FULL_CONFIDENCE;
            for &(position, member, attribute) in &deferred {
                let Some(chosen) = candidate.choice(position)? else {
                    continue;
                };
                let Some(spec) = attribute.feature() else {
                    continue;
                };
                let subject = board.entity(member)?.candidate(chosen)?.region();
                match related_regions(board, current, candidate, attribute)? {
                    Some(related) => {
                        let score = features.score(spec, subject, &related)?;
                        confidence = confidence.min(score.confidence);
                    }
                    None if attribute.is_essential() => confidence = 0.0,
                    None => {}
                }
            }
            lowered.push(confidence);
        }
    }

    let target = board.group_mut(group)?;
    for (candidate, confidence) in target.candidates_mut().iter_mut().zip(lowered) {
        candidate.lower_confidence(confidence);
    }
    tracing::debug!(
        group,
        candidates = target.candidates().len(),
        deferred = deferred_count,
        best = ?target.best_candidate(),
        "group confidence computed"
    );
    Ok(deferred_count)
}

/// Scores group candidates right after they were formed.
#[derive(Debug)]
pub struct GroupConfidenceWorker {
    features: Rc<FeatureRegistry>,
    last_group: Option<usize>,
}

impl GroupConfidenceWorker {
    #[must_use]
    pub fn new(features: Rc<FeatureRegistry>) -> Self {
        Self {
            features,
            last_group: None,
        }
    }
}

impl Worker for GroupConfidenceWorker {
    fn name(&self) -> &str {
        GROUP_CONFIDENCE
    }

    fn kind(&self) -> WorkerKind {
        WorkerKind::Confidence
    }

    fn score(&self, board: &Board) -> Result<f64, AgoraError> {
        if open_group(board).is_some() && last_record_is(board, GROUP_CANDIDATES, WorkerKind::Confidence) {
            Ok(SCORE_URGENT)
        } else {
            Ok(0.0)
        }
    }

    fn activate(&mut self, board: &mut Board) -> Result<(), AgoraError> {
        self.last_group = open_group(board).map(|(index, _)| index);
        if let Some(group) = self.last_group {
            score_group_candidates(board, &self.features, group)?;
        }
        Ok(())
    }

    fn on_activation_recorded(&self, board: &mut Board) -> Result<(), AgoraError> {
        match self.last_group {
            Some(group) => board.append_message_to_last(group_message(group)),
            None => Ok(()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeKind;
    use crate::feature::{FeatureSpec, Membership};
    use crate::grouping::form_groups;
    use crate::workers::fixtures::{board_with, link, mark_processed, select};

    fn registry() -> FeatureRegistry {
        FeatureRegistry::with_builtins()
    }

    fn area_feature(board: &mut Board, entity: usize, membership: Membership) {
        board
            .entity_mut(entity)
            .expect("entity")
            .add_attribute(Attribute::new(
                "size",
                AttributeKind::Feature(FeatureSpec::new("area", membership)),
            ))
            .expect("attr");
    }

    #[test]
    fn counter_visits_every_combination() {
        let radices = [2, 3];
        let mut digits = [0, 0];
        let mut seen = vec![digits];
        while advance(&mut digits, &radices) {
            seen.push(digits);
        }
        assert_eq!(seen.len(), 6);
        assert_eq!(seen[1], [0, 1]);
        assert_eq!(seen[5], [1, 2]);
    }

    #[test]
    fn ready_feature_scores_every_candidate() {
        let mut board = board_with(&["A"]);
        area_feature(&mut board, 0, Membership::new(0.0, 4.0, 4.0, 8.0).expect("membership"));
        let entity = board.entity_mut(0).expect("A");
        entity.add_candidate(Region::rect(0, 0, 2, 2));
        entity.add_candidate(Region::rect(0, 0, 1, 2));
        form_groups(&mut board).expect("form");

        let tally = score_entity(&mut board, &registry(), 0).expect("score");
        assert_eq!(tally.evaluated, 1);
        let candidates = board.entity(0).expect("A").candidates();
        assert_eq!(candidates[0].partial_confidence(), 1.0);
        assert_eq!(candidates[1].partial_confidence(), 0.5);
    }

    #[test]
    fn essential_unmatched_outside_target_vetoes() {
        let mut board = board_with(&["C", "D"]);
        link(&mut board, 0, 1, false, true);
        board.entity_mut(0).expect("C").add_candidate(Region::rect(0, 0, 1, 1));
        form_groups(&mut board).expect("form");

        let tally = score_entity(&mut board, &registry(), 0).expect("score");
        assert_eq!(tally.vetoed, 1);
        let candidate = &board.entity(0).expect("C").candidates()[0];
        assert_eq!(candidate.partial_confidence(), 0.0);
        assert_eq!(candidate.score(0).expect("slot"), Some(Score::vetoed()));
    }

    #[test]
    fn optional_unmatched_outside_target_stays_unset() {
        let mut board = board_with(&["C", "D"]);
        link(&mut board, 0, 1, false, false);
        board.entity_mut(0).expect("C").add_candidate(Region::rect(0, 0, 1, 1));
        form_groups(&mut board).expect("form");

        let tally = score_entity(&mut board, &registry(), 0).expect("score");
        assert_eq!(tally.skipped, 1);
        assert_eq!(board.entity(0).expect("C").candidates()[0].scored_count(), 0);
    }

    #[test]
    fn inside_target_is_deferred() {
        let mut board = board_with(&["A", "B"]);
        link(&mut board, 1, 0, true, false);
        board.entity_mut(1).expect("B").add_candidate(Region::rect(0, 0, 1, 1));
        form_groups(&mut board).expect("form");

        let tally = score_entity(&mut board, &registry(), 1).expect("score");
        assert_eq!(tally.deferred, 1);
        assert_eq!(board.entity(1).expect("B").candidates()[0].scored_count(), 0);
    }

    #[test]
    fn cross_product_size_and_min_aggregation() {
        let mut board = board_with(&["A", "B"]);
        link(&mut board, 1, 0, true, false);
        area_feature(&mut board, 0, Membership::new(0.0, 4.0, 4.0, 8.0).expect("membership"));
        {
            let a = board.entity_mut(0).expect("A");
            a.add_candidate(Region::rect(0, 0, 2, 2));
            a.add_candidate(Region::rect(0, 0, 1, 2));
            a.add_candidate(Region::new());
        }
        for x in 0..3 {
            board.entity_mut(1).expect("B").add_candidate(Region::rect(x, 0, x + 1, 1));
        }
        form_groups(&mut board).expect("form");
        score_entity(&mut board, &registry(), 0).expect("score A");

        // A's empty candidate scores 0 on area and drops out: 2 x 3.
        assert_eq!(form_group_candidates(&mut board, 0).expect("form"), 6);
        let group = board.group(0).expect("group");
        assert_eq!(group.candidates()[0].choices(), &[Some(0), Some(0)]);
        assert_eq!(group.candidates()[3].choices(), &[Some(1), Some(0)]);
        assert_eq!(group.candidates()[3].confidence(), 0.5);
    }

    #[test]
    fn member_without_live_candidates_empties_product() {
        let mut board = board_with(&["A", "B"]);
        link(&mut board, 1, 0, true, false);
        board.entity_mut(0).expect("A").add_candidate(Region::rect(0, 0, 1, 1));
        form_groups(&mut board).expect("form");
        assert_eq!(form_group_candidates(&mut board, 0).expect("form"), 0);
    }

    #[test]
    fn matched_members_stay_unbound() {
        let mut board = board_with(&["A", "B"]);
        link(&mut board, 1, 0, true, false);
        {
            let a = board.entity_mut(0).expect("A");
            a.add_candidate(Region::rect(0, 0, 1, 1));
            a.commit_matches(&[0]).expect("commit");
        }
        board.entity_mut(1).expect("B").add_candidate(Region::rect(1, 0, 2, 1));
        form_groups(&mut board).expect("form");

        assert_eq!(form_group_candidates(&mut board, 0).expect("form"), 1);
        assert_eq!(board.group(0).expect("group").candidates()[0].choices(), &[None, Some(0)]);
    }

    #[test]
    fn deferred_feature_scores_bound_pairs() {
        let mut board = board_with(&["A", "B"]);
        let near = Attribute::new(
            "near_a",
            AttributeKind::Feature(FeatureSpec::new(
                "centroid_distance",
                Membership::new(0.0, 0.0, 1.0, 3.0).expect("membership"),
            )),
        )
        .with_relation("A", 0)
        .as_bidirectional();
        board.entity_mut(1).expect("B").add_attribute(near).expect("attr");
        board.entity_mut(0).expect("A").add_candidate(Region::rect(0, 0, 1, 1));
        let b = board.entity_mut(1).expect("B");
        b.add_candidate(Region::rect(1, 0, 2, 1));
        b.add_candidate(Region::rect(2, 0, 3, 1));
        b.add_candidate(Region::rect(9, 0, 10, 1));
        form_groups(&mut board).expect("form");

        form_group_candidates(&mut board, 0).expect("form");
        let deferred = score_group_candidates(&mut board, &registry(), 0).expect("score");
        assert_eq!(deferred, 1);

        let confidences: Vec<f64> = board
            .group(0)
            .expect("group")
            .candidates()
            .iter()
            .map(GroupCandidate::confidence)
            .collect();
        assert_eq!(confidences, vec![1.0, 0.5, 0.0]);
        assert_eq!(board.group(0).expect("group").best_candidate(), Some(0));
    }

    /// Group {A, B}; B relates to A. Only B is bound and A has no matched
    /// result, so the deferred feature has nothing to read.
    fn unresolved_partner(essential: bool) -> f64 {
        let mut board = board_with(&["A", "B"]);
        link(&mut board, 1, 0, true, essential);
        board.entity_mut(1).expect("B").add_candidate(Region::rect(0, 0, 1, 1));
        form_groups(&mut board).expect("form");

        let mut candidate = GroupCandidate::new(2);
        candidate.bind(1, 0, 1.0).expect("bind");
        board.group_mut(0).expect("group").set_candidates(vec![candidate]);

        assert_eq!(score_group_candidates(&mut board, &registry(), 0).expect("score"), 1);
        board.group(0).expect("group").candidates()[0].confidence()
    }

    #[test]
    fn essential_unresolved_partner_zeroes_group_candidate() {
        assert_eq!(unresolved_partner(true), 0.0);
    }

    #[test]
    fn optional_unresolved_partner_is_ignored() {
        assert_eq!(unresolved_partner(false), 1.0);
    }

    #[test]
    fn workers_follow_the_chain() {
        let mut board = board_with(&["A"]);
        board.entity_mut(0).expect("A").add_candidate(Region::rect(0, 0, 1, 1));
        form_groups(&mut board).expect("form");
        select(&mut board, 0);

        let features = Rc::new(registry());
        let mut entity_worker = EntityConfidenceWorker::new(Rc::clone(&features));
        let mut candidates_worker = GroupCandidatesWorker::new();
        let group_worker = GroupConfidenceWorker::new(features);

        assert_eq!(entity_worker.score(&board).expect("score"), 0.0);
        board.append_activation_record("segmenter", WorkerKind::Segmentation);
        assert_eq!(entity_worker.score(&board).expect("score"), SCORE_URGENT);

        entity_worker.activate(&mut board).expect("activate");
        mark_processed(&mut board, 0);
        assert_eq!(entity_worker.score(&board).expect("score"), 0.0);
        assert_eq!(candidates_worker.score(&board).expect("score"), SCORE_URGENT);

        candidates_worker.activate(&mut board).expect("activate");
        board.append_activation_record(GROUP_CANDIDATES, WorkerKind::Confidence);
        candidates_worker.on_activation_recorded(&mut board).expect("record");
        assert!(board.last_record().expect("record").has_message("group:0"));
        assert_eq!(candidates_worker.score(&board).expect("score"), 0.0);
        assert_eq!(group_worker.score(&board).expect("score"), SCORE_URGENT);
    }
}
