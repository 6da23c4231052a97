//! End-to-end cascades over hand-built case graphs.

use std::sync::Arc;

use cmmn_core::CaseId;
use cmmn_engine::{
    CaseGraph, EngineConfig, EngineError, ExecutionContext, FileItemId, ItemId, MilestoneData,
    OnPartSource, PlanItemKind, Property, RecordingSink, Rule, SentryKind, StageData, Subject,
    TaskData, UnresolvedPredicatePolicy,
};
use cmmn_state::{CaseFileItemState, FileItemTransition, PlanItemState, Transition, TransitionOutcome};
use parking_lot::Mutex;

use PlanItemState::*;

// ─── Helpers ─────────────────────────────────────────────────────────

struct Case {
    graph: CaseGraph,
    data: FileItemId,
}

impl Case {
    fn new(auto_complete: bool) -> Self {
        let mut graph = CaseGraph::new(CaseId::new(), "case", "Case", auto_complete).unwrap();
        let data = graph.add_file_item("data", "Data").unwrap();
        Self { graph, data }
    }

    fn always(&self) -> Rule {
        Rule::new("always", self.data)
    }

    fn stage(&mut self, parent: ItemId, cm_id: &str, stage: StageData) -> ItemId {
        self.graph.add_item(parent, cm_id, cm_id, PlanItemKind::Stage(stage)).unwrap()
    }

    fn task(&mut self, parent: ItemId, cm_id: &str, task: TaskData) -> ItemId {
        self.graph.add_item(parent, cm_id, cm_id, PlanItemKind::Task(task)).unwrap()
    }

    fn milestone(&mut self, parent: ItemId, cm_id: &str) -> ItemId {
        self.graph
            .add_item(parent, cm_id, cm_id, PlanItemKind::Milestone(MilestoneData::default()))
            .unwrap()
    }

    /// Entry or exit sentry on `item` observing `sources`.
    fn sentry(&mut self, cm_id: &str, kind: SentryKind, item: ItemId, sources: &[(ItemId, Transition)]) {
        let sentry = self.graph.add_sentry(cm_id, kind, item).unwrap();
        for &(source, transition) in sources {
            self.graph
                .add_on_part(sentry, OnPartSource::Element { item: source, transition })
                .unwrap();
        }
    }

    fn state(&self, id: ItemId) -> PlanItemState {
        self.graph.state(id).unwrap()
    }

    fn fire(&mut self, ctx: &ExecutionContext, id: ItemId, t: Transition) -> TransitionOutcome<PlanItemState> {
        self.graph.fire(ctx, id, t).unwrap()
    }

    fn count(&self, cm_id: &str, transition: &str) -> usize {
        self.graph
            .log()
            .iter()
            .filter(|r| r.subject == cm_id && r.transition == transition)
            .count()
    }
}

// ─── Creation ────────────────────────────────────────────────────────

#[test]
fn test_create_cascade_completes_root_stage_and_non_blocking_task() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(true);
    let required = case.always();
    let s = case.stage(ItemId::ROOT, "S", StageData::new(true).with_required(required));
    let t = case.task(s, "T", TaskData::human().non_blocking());

    let outcome = case.graph.create(&ctx).unwrap();

    assert_eq!(outcome, TransitionOutcome::Applied { from: Initial, to: Completed });
    assert_eq!(case.state(t), Completed);
    assert_eq!(case.state(s), Completed);
    assert_eq!(case.graph.root_state(), Completed);
}

#[test]
fn test_non_blocking_task_create_yields_completed() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let t = case.task(ItemId::ROOT, "T", TaskData::human().non_blocking());

    let outcome = case.fire(&ctx, t, Transition::Create);

    assert_eq!(outcome, TransitionOutcome::Applied { from: Initial, to: Completed });
    assert_eq!(case.count("T", "start"), 0);
    assert_eq!(case.count("T", "complete"), 1);
}

#[test]
fn test_manual_activation_enables_instead_of_starting() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let manual = case.always();
    let t = case.task(ItemId::ROOT, "T", TaskData::human().with_manual_activation(manual));
    let u = case.task(ItemId::ROOT, "U", TaskData::human());

    case.graph.create(&ctx).unwrap();

    assert_eq!(case.state(t), Enabled);
    assert_eq!(case.state(u), Active);
    assert!(case.fire(&ctx, t, Transition::ManualStart).is_applied());
    assert_eq!(case.state(t), Active);
}

#[test]
fn test_empty_auto_complete_stage_completes_after_activation() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let s = case.stage(ItemId::ROOT, "S", StageData::new(true));

    case.graph.create(&ctx).unwrap();

    assert_eq!(case.state(s), Completed);
    assert_eq!(case.graph.root_state(), Active);
}

// ─── Sentries ────────────────────────────────────────────────────────

#[test]
fn test_entry_criteria_require_every_on_part() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let a1 = case.task(ItemId::ROOT, "A1", TaskData::human());
    let a2 = case.task(ItemId::ROOT, "A2", TaskData::human());
    let b = case.task(ItemId::ROOT, "B", TaskData::human());
    case.sentry(
        "afterBoth",
        SentryKind::Entry,
        b,
        &[(a1, Transition::Complete), (a2, Transition::Complete)],
    );
    case.graph.create(&ctx).unwrap();
    assert_eq!(case.state(b), Available);

    // The later on-part is satisfied, the earlier one is not.
    case.fire(&ctx, a2, Transition::Complete);
    assert_eq!(case.state(b), Available);

    case.fire(&ctx, a1, Transition::Complete);
    assert_eq!(case.state(b), Active);
}

#[test]
fn test_entry_sentry_fires_exactly_once() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let a = case.task(ItemId::ROOT, "A", TaskData::human());
    let b = case.task(ItemId::ROOT, "B", TaskData::human());
    case.sentry("afterA", SentryKind::Entry, b, &[(a, Transition::Complete)]);
    case.graph.create(&ctx).unwrap();

    case.fire(&ctx, a, Transition::Complete);
    assert_eq!(case.state(b), Active);

    // Further requests on A are no-ops and do not re-trigger B.
    assert!(!case.fire(&ctx, a, Transition::Complete).is_applied());
    assert!(!case.fire(&ctx, a, Transition::Start).is_applied());
    assert_eq!(case.count("B", "start"), 1);
}

#[test]
fn test_on_part_reset_by_other_transition() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let a = case.task(ItemId::ROOT, "A", TaskData::human());
    let b = case.task(ItemId::ROOT, "B", TaskData::human());
    let c = case.task(ItemId::ROOT, "C", TaskData::human());
    case.sentry(
        "gate",
        SentryKind::Entry,
        c,
        &[(a, Transition::Suspend), (b, Transition::Complete)],
    );
    case.graph.create(&ctx).unwrap();

    case.fire(&ctx, a, Transition::Suspend);
    case.fire(&ctx, a, Transition::Resume);
    case.fire(&ctx, b, Transition::Complete);
    assert_eq!(case.state(c), Available);
}

fn if_part_case(approved: bool) -> Case {
    let mut ctx = ExecutionContext::default();
    ctx.predicates.register("approved", |item| {
        item.property("approved").and_then(|p| p.as_bool()) == Some(true)
    });
    let mut case = Case::new(false);
    let data = case.data;
    let a = case.task(ItemId::ROOT, "A", TaskData::human());
    let b = case.task(ItemId::ROOT, "B", TaskData::human());
    let sentry = case.graph.add_sentry("gate", SentryKind::Entry, b).unwrap();
    case.graph
        .add_on_part(sentry, OnPartSource::Element { item: a, transition: Transition::Complete })
        .unwrap();
    case.graph
        .set_if_part(sentry, cmmn_engine::IfPart::new("approved", data))
        .unwrap();

    case.graph.create(&ctx).unwrap();
    case.graph.create_file_item(&ctx, data).unwrap();
    case.graph
        .set_property(&ctx, data, Property::boolean("approved", approved))
        .unwrap();
    case.graph.fire(&ctx, a, Transition::Complete).unwrap();
    case
}

#[test]
fn test_if_part_guards_entry() {
    let approved = if_part_case(true);
    assert_eq!(approved.state(approved.graph.require("B").unwrap()), Active);

    let rejected = if_part_case(false);
    let b = rejected.graph.require("B").unwrap();
    assert_eq!(rejected.state(b), Available);
    assert!(!rejected.graph.sentry(rejected.graph.item(b).unwrap().sentries[0]).unwrap().satisfied);
}

#[test]
fn test_file_item_on_part_starts_task() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let data = case.data;
    let review = case.task(ItemId::ROOT, "review", TaskData::human());
    let sentry = case.graph.add_sentry("onUpdate", SentryKind::Entry, review).unwrap();
    case.graph
        .add_on_part(sentry, OnPartSource::FileItem { item: data, transition: FileItemTransition::Update })
        .unwrap();
    case.graph.create(&ctx).unwrap();
    case.graph.create_file_item(&ctx, data).unwrap();
    assert_eq!(case.state(review), Available);

    case.graph
        .set_property(&ctx, data, Property::string("status", "draft"))
        .unwrap();
    assert_eq!(case.state(review), Active);
}

#[test]
fn test_exit_sentry_terminates_active_task() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let x = case.task(ItemId::ROOT, "X", TaskData::human());
    let m = case.milestone(ItemId::ROOT, "M");
    case.sentry("onM", SentryKind::Exit, x, &[(m, Transition::Occur)]);
    case.graph.create(&ctx).unwrap();
    assert_eq!(case.state(x), Active);
    assert_eq!(case.state(m), Available);

    case.fire(&ctx, m, Transition::Occur);

    assert_eq!(case.state(m), Completed);
    assert_eq!(case.state(x), Terminated);
}

#[test]
fn test_exit_sentry_on_root_terminates_case() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let m = case.milestone(ItemId::ROOT, "abort");
    case.sentry("onAbort", SentryKind::Exit, ItemId::ROOT, &[(m, Transition::Occur)]);
    case.graph.create(&ctx).unwrap();

    case.fire(&ctx, m, Transition::Occur);

    assert_eq!(case.graph.root_state(), Terminated);
}

// ─── Disallowed transitions ──────────────────────────────────────────

#[test]
fn test_disallowed_transition_changes_nothing() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let s = case.stage(ItemId::ROOT, "S", StageData::new(false));
    let t = case.task(s, "T", TaskData::human());
    case.graph.create(&ctx).unwrap();
    let before: Vec<_> = case.graph.walk().into_iter().map(|id| case.state(id)).collect();
    let log_len = case.graph.log().len();

    let outcome = case.fire(&ctx, t, Transition::Enable);

    assert_eq!(outcome, TransitionOutcome::Disallowed { state: Active, transition: "enable" });
    let after: Vec<_> = case.graph.walk().into_iter().map(|id| case.state(id)).collect();
    assert_eq!(before, after);
    assert_eq!(case.graph.log().len(), log_len);
    assert_eq!(
        case.fire(&ctx, s, Transition::Occur),
        TransitionOutcome::Disallowed { state: Active, transition: "occur" }
    );
}

#[test]
fn test_case_complete_guarded_by_active_children() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let t = case.task(ItemId::ROOT, "T", TaskData::human());
    case.graph.create(&ctx).unwrap();

    assert_eq!(
        case.fire(&ctx, ItemId::ROOT, Transition::Complete),
        TransitionOutcome::GuardRejected { state: Active, transition: "complete" }
    );

    case.fire(&ctx, t, Transition::Complete);
    assert!(case.fire(&ctx, ItemId::ROOT, Transition::Complete).is_applied());
    assert_eq!(case.graph.root_state(), Completed);
}

// ─── Auto-completion ─────────────────────────────────────────────────

#[test]
fn test_stage_waits_for_both_required_tasks() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let s = case.stage(ItemId::ROOT, "S", StageData::new(true));
    let r1 = case.always();
    let r2 = case.always();
    let t1 = case.task(s, "T1", TaskData::human().with_required(r1));
    let t2 = case.task(s, "T2", TaskData::human().with_required(r2));
    case.graph.create(&ctx).unwrap();

    case.fire(&ctx, t1, Transition::Complete);
    assert_eq!(case.state(t2), Active);
    assert_eq!(case.state(s), Active);

    case.fire(&ctx, t2, Transition::Complete);
    assert_eq!(case.state(s), Completed);
}

#[test]
fn test_enabled_required_task_blocks_until_disabled() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let s = case.stage(ItemId::ROOT, "S", StageData::new(true));
    let required = case.always();
    let manual = case.always();
    let t1 = case.task(s, "T1", TaskData::human());
    let t2 = case.task(
        s,
        "T2",
        TaskData::human().with_required(required).with_manual_activation(manual),
    );
    case.graph.create(&ctx).unwrap();
    assert_eq!(case.state(t2), Enabled);

    case.fire(&ctx, t1, Transition::Complete);
    assert_eq!(case.state(s), Active);

    case.fire(&ctx, t2, Transition::Disable);
    assert_eq!(case.state(s), Completed);
}

#[test]
fn test_optional_enabled_task_does_not_block() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let s = case.stage(ItemId::ROOT, "S", StageData::new(true));
    let manual = case.always();
    let t1 = case.task(s, "T1", TaskData::human());
    case.task(s, "T2", TaskData::human().with_manual_activation(manual));
    case.graph.create(&ctx).unwrap();

    case.fire(&ctx, t1, Transition::Complete);

    assert_eq!(case.state(s), Completed);
}

#[test]
fn test_completion_propagates_to_root() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(true);
    let outer = case.stage(ItemId::ROOT, "outer", StageData::new(true));
    let inner = case.stage(outer, "inner", StageData::new(true));
    let t = case.task(inner, "T", TaskData::human());
    case.graph.create(&ctx).unwrap();
    assert_eq!(case.graph.root_state(), Active);

    case.fire(&ctx, t, Transition::Complete);

    assert_eq!(case.state(inner), Completed);
    assert_eq!(case.state(outer), Completed);
    assert_eq!(case.graph.root_state(), Completed);
}

// ─── Suspend / resume / exit ─────────────────────────────────────────

#[test]
fn test_stage_suspend_resume_restores_descendants() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let s = case.stage(ItemId::ROOT, "S", StageData::new(false));
    let manual = case.always();
    let t1 = case.task(s, "T1", TaskData::human());
    let t2 = case.task(s, "T2", TaskData::human().with_manual_activation(manual));
    let m = case.milestone(s, "M");
    let done = case.task(s, "done", TaskData::human());
    let nested = case.stage(s, "S2", StageData::new(false));
    let t3 = case.task(nested, "T3", TaskData::human());
    case.graph.create(&ctx).unwrap();
    case.fire(&ctx, done, Transition::Complete);
    let subtree = case.graph.walk_from(s);
    let before: Vec<_> = subtree.iter().map(|id| case.state(*id)).collect();

    case.fire(&ctx, s, Transition::Suspend);
    for id in &subtree {
        assert!(case.graph.item(*id).unwrap().suspended, "{id:?} not suspended");
    }
    assert_eq!(case.state(t1), Suspended);
    assert_eq!(case.state(t2), Suspended);
    assert_eq!(case.state(m), Suspended);
    assert_eq!(case.state(t3), Suspended);
    assert_eq!(case.state(done), Completed);

    case.fire(&ctx, s, Transition::Resume);
    let after: Vec<_> = subtree.iter().map(|id| case.state(*id)).collect();
    assert_eq!(before, after);
    for id in &subtree {
        let item = case.graph.item(*id).unwrap();
        assert!(!item.suspended, "{id:?} still suspended");
        assert!(item.state_before_suspend.is_none());
    }
}

#[test]
fn test_stage_resume_clears_own_suspended_flag() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let s = case.stage(ItemId::ROOT, "S", StageData::new(false));
    case.task(s, "T", TaskData::human());
    case.graph.create(&ctx).unwrap();

    case.fire(&ctx, s, Transition::Suspend);
    assert!(case.graph.item(s).unwrap().suspended);
    case.fire(&ctx, s, Transition::Resume);

    let stage = case.graph.item(s).unwrap();
    assert_eq!(stage.state, Active);
    assert!(!stage.suspended);
}

#[test]
fn test_own_suspension_survives_parent_resume() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let s = case.stage(ItemId::ROOT, "S", StageData::new(false));
    let t1 = case.task(s, "T1", TaskData::human());
    let t2 = case.task(s, "T2", TaskData::human());
    case.graph.create(&ctx).unwrap();

    case.fire(&ctx, t1, Transition::Suspend);
    case.fire(&ctx, s, Transition::Suspend);
    case.fire(&ctx, s, Transition::Resume);

    assert_eq!(case.state(t1), Suspended);
    assert_eq!(case.state(t2), Active);
}

#[test]
fn test_case_suspend_and_reactivate() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let t = case.task(ItemId::ROOT, "T", TaskData::human());
    case.graph.create(&ctx).unwrap();

    case.fire(&ctx, ItemId::ROOT, Transition::Suspend);
    assert_eq!(case.graph.root_state(), Suspended);
    assert_eq!(case.state(t), Suspended);

    case.fire(&ctx, ItemId::ROOT, Transition::ReActivate);
    assert_eq!(case.graph.root_state(), Active);
    assert_eq!(case.state(t), Active);
}

#[test]
fn test_stage_exit_cascades_to_children() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let s = case.stage(ItemId::ROOT, "S", StageData::new(false));
    let t = case.task(s, "T", TaskData::human());
    let m = case.milestone(s, "M");
    let done = case.task(s, "done", TaskData::human());
    case.graph.create(&ctx).unwrap();
    case.fire(&ctx, done, Transition::Complete);

    case.fire(&ctx, s, Transition::Exit);

    assert_eq!(case.state(s), Terminated);
    assert_eq!(case.state(t), Terminated);
    assert_eq!(case.state(m), Terminated);
    assert_eq!(case.state(done), Completed);
}

// ─── Parent activation ───────────────────────────────────────────────

#[test]
fn test_child_stage_activates_enabled_parent() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let manual = case.always();
    let s = case.stage(ItemId::ROOT, "S", StageData::new(false).with_manual_activation(manual));
    let s2 = case.stage(s, "S2", StageData::new(false));
    let t = case.task(s2, "T", TaskData::human());
    case.graph.create(&ctx).unwrap();
    assert_eq!(case.state(s), Enabled);
    assert_eq!(case.state(s2), Initial);

    case.fire(&ctx, s2, Transition::Create);

    assert_eq!(case.state(s2), Active);
    assert_eq!(case.state(s), Active);
    assert_eq!(case.state(t), Active);
}

#[test]
fn test_available_parent_notifies_enable_and_manual_start() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let gate = case.task(ItemId::ROOT, "gate", TaskData::human());
    let s = case.stage(ItemId::ROOT, "S", StageData::new(false));
    let s2 = case.stage(s, "S2", StageData::new(false));
    let watcher = case.task(ItemId::ROOT, "watcher", TaskData::human());
    case.sentry("afterGate", SentryKind::Entry, s, &[(gate, Transition::Complete)]);
    case.sentry("onManualStart", SentryKind::Entry, watcher, &[(s, Transition::ManualStart)]);
    case.graph.create(&ctx).unwrap();
    assert_eq!(case.state(s), Available);
    assert_eq!(case.state(watcher), Available);

    case.fire(&ctx, s2, Transition::Create);

    assert_eq!(case.state(s), Active);
    assert_eq!(case.state(watcher), Active);
    assert_eq!(case.count("S", "enable"), 1);
    assert_eq!(case.count("S", "manualStart"), 1);
}

// ─── Repetition ──────────────────────────────────────────────────────

fn repeatable_review(case: &mut Case) -> ItemId {
    let data = case.data;
    let rule = case.always();
    let review = case.task(ItemId::ROOT, "review", TaskData::human().with_repetition(rule));
    let sentry = case.graph.add_sentry("onUpdate", SentryKind::Entry, review).unwrap();
    case.graph
        .add_on_part(sentry, OnPartSource::FileItem { item: data, transition: FileItemTransition::Update })
        .unwrap();
    review
}

#[test]
fn test_repeatable_task_spawns_instances() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let data = case.data;
    let review = repeatable_review(&mut case);
    case.graph.create(&ctx).unwrap();
    case.graph.create_file_item(&ctx, data).unwrap();

    case.graph.set_property(&ctx, data, Property::integer("rev", 1)).unwrap();
    assert_eq!(case.state(review), Active);

    case.graph.set_property(&ctx, data, Property::integer("rev", 2)).unwrap();
    case.graph.set_property(&ctx, data, Property::integer("rev", 3)).unwrap();

    let all = case.graph.tasks_with_cm_id("review");
    assert_eq!(all.len(), 3);
    let second = case.graph.require("review#2").unwrap();
    let third = case.graph.require("review#3").unwrap();
    assert_eq!(case.state(second), Active);
    assert_eq!(case.state(third), Active);
    assert!(case.graph.item(second).unwrap().sentries.is_empty());
}

#[test]
fn test_repetition_cap() {
    let mut config = EngineConfig::default();
    config.max_repetition_instances = 1;
    let ctx = ExecutionContext::new(config);
    let mut case = Case::new(false);
    let data = case.data;
    repeatable_review(&mut case);
    case.graph.create(&ctx).unwrap();
    case.graph.create_file_item(&ctx, data).unwrap();

    for rev in 0..4 {
        case.graph.set_property(&ctx, data, Property::integer("rev", rev)).unwrap();
    }

    assert_eq!(case.graph.tasks_with_cm_id("review").len(), 2);
}

#[test]
fn test_instance_copies_exit_sentries() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let data = case.data;
    let review = repeatable_review(&mut case);
    let abort = case.milestone(ItemId::ROOT, "abort");
    case.sentry("onAbort", SentryKind::Exit, review, &[(abort, Transition::Occur)]);
    case.graph.create(&ctx).unwrap();
    case.graph.create_file_item(&ctx, data).unwrap();
    case.graph.set_property(&ctx, data, Property::integer("rev", 1)).unwrap();
    case.graph.set_property(&ctx, data, Property::integer("rev", 2)).unwrap();
    let second = case.graph.require("review#2").unwrap();

    case.fire(&ctx, abort, Transition::Occur);

    assert_eq!(case.state(review), Terminated);
    assert_eq!(case.state(second), Terminated);
}

#[test]
fn test_stage_repeats_in_place() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let s = case.stage(ItemId::ROOT, "S", StageData::new(true).with_repetition(1, None));
    let t = case.task(s, "T", TaskData::human());
    case.graph.create(&ctx).unwrap();

    case.fire(&ctx, t, Transition::Complete);
    assert_eq!(case.state(s), Active);
    assert_eq!(case.state(t), Active);
    match &case.graph.item(s).unwrap().kind {
        PlanItemKind::Stage(stage) => assert_eq!(stage.current_repetition, 1),
        other => panic!("unexpected kind {other:?}"),
    }

    case.fire(&ctx, t, Transition::Complete);
    assert_eq!(case.state(s), Completed);
    assert_eq!(case.count("S", "complete"), 2);
}

#[test]
fn test_stage_cycle_resets_task_instance_cap() {
    let mut config = EngineConfig::default();
    config.max_repetition_instances = 1;
    let ctx = ExecutionContext::new(config);
    let mut case = Case::new(false);
    let data = case.data;
    let rule = case.always();
    let s = case.stage(ItemId::ROOT, "S", StageData::new(true).with_repetition(1, None));
    let review = case.task(s, "review", TaskData::human().with_repetition(rule));
    let entry = case.graph.add_sentry("onUpdate", SentryKind::Entry, review).unwrap();
    case.graph
        .add_on_part(entry, OnPartSource::FileItem { item: data, transition: FileItemTransition::Update })
        .unwrap();
    let abort = case.milestone(ItemId::ROOT, "abort");
    case.sentry("onAbort", SentryKind::Exit, review, &[(abort, Transition::Occur)]);
    case.graph.create(&ctx).unwrap();
    case.graph.create_file_item(&ctx, data).unwrap();

    for rev in 1..=3 {
        case.graph.set_property(&ctx, data, Property::integer("rev", rev)).unwrap();
    }
    assert_eq!(case.graph.tasks_with_cm_id("review").len(), 2);
    let first_cycle = case.graph.require("review#2").unwrap();
    case.fire(&ctx, review, Transition::Complete);
    case.fire(&ctx, first_cycle, Transition::Complete);
    assert_eq!(case.state(s), Active);
    assert_eq!(case.state(review), Available);

    for rev in 4..=6 {
        case.graph.set_property(&ctx, data, Property::integer("rev", rev)).unwrap();
    }
    assert_eq!(case.graph.tasks_with_cm_id("review").len(), 2);
    let second_cycle = case.graph.require("review#2").unwrap();
    assert_ne!(second_cycle, first_cycle);
    assert_eq!(case.state(second_cycle), Active);

    let observers = &case.graph.item(abort).unwrap().observers;
    for sentry in &case.graph.item(first_cycle).unwrap().sentries {
        for on_part in &case.graph.sentry(*sentry).unwrap().on_parts {
            assert!(!observers.contains(on_part));
        }
    }
    let exits = case.count("review#2", "exit");
    case.fire(&ctx, abort, Transition::Occur);
    assert_eq!(case.state(second_cycle), Terminated);
    assert_eq!(case.state(first_cycle), Completed);
    assert_eq!(case.count("review#2", "exit"), exits + 1);
}

#[test]
fn test_stage_repetition_rule_false_completes() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let never = Rule::new("never", case.data);
    let s = case.stage(ItemId::ROOT, "S", StageData::new(true).with_repetition(3, Some(never)));
    let t = case.task(s, "T", TaskData::human());
    case.graph.create(&ctx).unwrap();

    case.fire(&ctx, t, Transition::Complete);

    assert_eq!(case.state(s), Completed);
}

// ─── Implementations ─────────────────────────────────────────────────

#[test]
fn test_process_runner_called_on_start() {
    let started = Arc::new(Mutex::new(Vec::new()));
    let mut ctx = ExecutionContext::default();
    let log = Arc::clone(&started);
    ctx.implementations.register_process("provideData", move |start| {
        log.lock().push(start.cm_id.to_string());
        Ok(())
    });
    let mut case = Case::new(false);
    let p = case.task(ItemId::ROOT, "provideData", TaskData::process());

    case.graph.create(&ctx).unwrap();

    assert_eq!(case.state(p), Active);
    assert_eq!(*started.lock(), vec!["provideData".to_string()]);
}

#[test]
fn test_unresolved_implementation_rolls_back() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let p = case.task(ItemId::ROOT, "provideData", TaskData::process());

    let err = case.graph.create(&ctx).unwrap_err();

    assert!(matches!(err, EngineError::UnresolvedImplementation { cm_id } if cm_id == "provideData"));
    assert_eq!(case.graph.root_state(), Initial);
    assert_eq!(case.state(p), Initial);
    assert!(case.graph.log().is_empty());
}

#[test]
fn test_failing_runner_rolls_back() {
    let mut ctx = ExecutionContext::default();
    ctx.implementations
        .register_process("provideData", |_| Err("backend unavailable".to_string()));
    let mut case = Case::new(false);
    case.task(ItemId::ROOT, "provideData", TaskData::process());

    let err = case.graph.create(&ctx).unwrap_err();

    assert!(matches!(err, EngineError::ImplementationFailed { reason, .. } if reason == "backend unavailable"));
    assert_eq!(case.graph.root_state(), Initial);
}

fn sub_case_context() -> ExecutionContext {
    let mut ctx = ExecutionContext::default();
    ctx.implementations.register_sub_case("createSpecs", |id| {
        let mut sub = CaseGraph::new(id, "specs", "Specs", true)?;
        sub.add_item(ItemId::ROOT, "write", "Write", PlanItemKind::Task(TaskData::human()))?;
        Ok(sub)
    });
    ctx
}

#[test]
fn test_case_task_completes_with_sub_case() {
    let ctx = sub_case_context();
    let mut case = Case::new(false);
    let task = case.task(ItemId::ROOT, "createSpecs", TaskData::case());
    case.graph.create(&ctx).unwrap();

    assert_eq!(case.state(task), Active);
    let parent_id = case.graph.id;
    let sub = case.graph.sub_case(task).unwrap();
    assert_eq!(sub.root_state(), Active);
    let binding = sub.case_task().unwrap();
    assert_eq!(binding.parent_case, parent_id);
    assert_eq!(binding.task.as_str(), "createSpecs");

    case.graph
        .with_sub_case(&ctx, task, |sub| sub.fire_by_cm_id(&ctx, "write", Transition::Complete))
        .unwrap();

    assert_eq!(case.graph.sub_case(task).unwrap().root_state(), Completed);
    assert_eq!(case.state(task), Completed);
}

#[test]
fn test_sub_case_failure_rolls_back_both_graphs() {
    let ctx = sub_case_context();
    let mut case = Case::new(false);
    let task = case.task(ItemId::ROOT, "createSpecs", TaskData::case());
    case.graph.create(&ctx).unwrap();

    let err = case
        .graph
        .with_sub_case(&ctx, task, |sub| {
            sub.fire_by_cm_id(&ctx, "write", Transition::Complete)?;
            sub.fire_by_cm_id(&ctx, "missing", Transition::Complete)
        })
        .unwrap_err();

    assert!(matches!(err, EngineError::UnknownCmId { .. }));
    let sub = case.graph.sub_case(task).unwrap();
    assert_eq!(sub.state(sub.require("write").unwrap()).unwrap(), Active);
    assert_eq!(case.state(task), Active);
}

// ─── Case file ───────────────────────────────────────────────────────

#[test]
fn test_file_operations_follow_item_lifecycle() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let data = case.data;
    let child = case.graph.add_file_item("attachment", "Attachment").unwrap();

    let early = case.graph.set_property(&ctx, data, Property::string("k", "v")).unwrap();
    assert!(matches!(early, TransitionOutcome::Disallowed { state: CaseFileItemState::Initial, .. }));
    assert!(case.graph.file_item(data).unwrap().properties.is_empty());

    case.graph.create_file_item(&ctx, data).unwrap();
    case.graph.create_file_item(&ctx, child).unwrap();
    case.graph.set_property(&ctx, data, Property::string("k", "v")).unwrap();
    case.graph.add_file_child(&ctx, data, child).unwrap();
    case.graph.add_file_reference(&ctx, child, data).unwrap();
    let item = case.graph.file_item(data).unwrap();
    assert_eq!(item.children, vec![child]);
    assert_eq!(case.graph.file_item(child).unwrap().parent, Some(data));
    assert_eq!(case.graph.file_item(child).unwrap().references, vec![data]);

    case.graph
        .replace_properties(&ctx, data, vec![Property::integer("n", 7)])
        .unwrap();
    assert_eq!(case.graph.file_item(data).unwrap().properties.len(), 1);

    case.graph.remove_file_child(&ctx, data, child).unwrap();
    assert!(case.graph.file_item(data).unwrap().children.is_empty());
    assert_eq!(case.graph.file_item(child).unwrap().parent, None);

    let deleted = case.graph.delete_file_item(&ctx, data).unwrap();
    assert_eq!(
        deleted,
        TransitionOutcome::Applied {
            from: CaseFileItemState::Available,
            to: CaseFileItemState::Discarded
        }
    );
    let late = case.graph.set_property(&ctx, data, Property::string("k", "w")).unwrap();
    assert!(!late.is_applied());
    assert_eq!(case.graph.file_item(data).unwrap().property("n").unwrap().value, "7");
}

#[test]
fn test_file_child_cycles_are_rejected() {
    let ctx = ExecutionContext::default();
    let mut case = Case::new(false);
    let data = case.data;
    let folder = case.graph.add_file_item("folder", "Folder").unwrap();
    let doc = case.graph.add_file_item("doc", "Doc").unwrap();
    for item in [data, folder, doc] {
        case.graph.create_file_item(&ctx, item).unwrap();
    }
    case.graph.add_file_child(&ctx, data, folder).unwrap();
    case.graph.add_file_child(&ctx, folder, doc).unwrap();
    let log = case.graph.log().len();

    let err = case.graph.add_file_child(&ctx, data, data).unwrap_err();
    assert!(matches!(err, EngineError::FileItemCycle { ref parent, .. } if parent == "data"));
    let err = case.graph.add_file_child(&ctx, doc, data).unwrap_err();
    assert!(matches!(err, EngineError::FileItemCycle { ref child, .. } if child == "data"));
    assert_eq!(case.graph.file_item(data).unwrap().parent, None);
    assert!(case.graph.file_item(doc).unwrap().children.is_empty());
    assert_eq!(case.graph.log().len(), log);

    case.graph.add_file_child(&ctx, data, doc).unwrap();
    assert_eq!(case.graph.file_item(doc).unwrap().parent, Some(data));
    assert!(case.graph.file_item(folder).unwrap().children.is_empty());
    assert_eq!(case.graph.file_item(data).unwrap().children, vec![folder, doc]);
}

// ─── Context ─────────────────────────────────────────────────────────

#[test]
fn test_change_sink_receives_events() {
    let sink = Arc::new(RecordingSink::new());
    let ctx = ExecutionContext::default().with_sink(sink.clone());
    let mut case = Case::new(false);
    case.task(ItemId::ROOT, "T", TaskData::human());

    case.graph.create(&ctx).unwrap();

    let events = sink.events();
    assert_eq!(events[0].subject, Subject::PlanItem(ItemId::ROOT));
    assert_eq!(events[0].transition, "create");
    assert_eq!(events[0].new_state, "ACTIVE");
    assert!(events.iter().any(|e| e.cm_id == "T" && e.new_state == "ACTIVE"));
    assert_eq!(events.len(), case.graph.log().len());
}

#[test]
fn test_cascade_depth_limit_rolls_back() {
    let mut config = EngineConfig::default();
    config.max_cascade_depth = 2;
    let ctx = ExecutionContext::new(config);
    let mut case = Case::new(false);
    let s = case.stage(ItemId::ROOT, "S", StageData::new(false));

    let err = case.graph.create(&ctx).unwrap_err();

    assert!(matches!(err, EngineError::CascadeDepthExceeded { limit: 2 }));
    assert_eq!(case.state(s), Initial);
    assert_eq!(case.graph.root_state(), Initial);
}

#[test]
fn test_rolled_back_cascade_publishes_nothing() {
    let sink = Arc::new(RecordingSink::new());
    let mut config = EngineConfig::default();
    config.max_cascade_depth = 2;
    let shallow = ExecutionContext::new(config).with_sink(sink.clone());
    let mut case = Case::new(false);
    case.stage(ItemId::ROOT, "S", StageData::new(false));

    assert!(case.graph.create(&shallow).is_err());
    assert!(sink.events().is_empty());
    assert!(case.graph.log().is_empty());

    let ctx = ExecutionContext::default().with_sink(sink.clone());
    case.graph.create(&ctx).unwrap();
    assert_eq!(sink.events().len(), case.graph.log().len());
}

#[test]
fn test_unresolved_predicate_policies() {
    let mut case = Case::new(false);
    let missing = Rule::new("missing", case.data);
    let t = case.task(ItemId::ROOT, "T", TaskData::human().with_manual_activation(missing));

    let mut strict = EngineConfig::default();
    strict.unresolved_predicate = UnresolvedPredicatePolicy::Error;
    let err = case.graph.create(&ExecutionContext::new(strict)).unwrap_err();
    assert!(matches!(err, EngineError::UnresolvedPredicate { name } if name == "missing"));
    assert_eq!(case.state(t), Initial);

    case.graph.create(&ExecutionContext::default()).unwrap();
    assert_eq!(case.state(t), Active);
}
