use crate::rule::executor::RuleOutput;
use engine_config::report::finding::Finding;
use model::{
    core::value::{FieldValue, Value},
    plan::mutation::{FieldPlan, PlanKind, Provenance, RowMutation, RowTarget},
    records::row::Row,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Consolidated per-row writes for one stage.
#[derive(Debug, Clone, Default)]
pub struct ChangePlan {
    pub mutations: Vec<RowMutation>,
    pub findings: Vec<Finding>,
    pub conflicts: usize,
}

impl ChangePlan {
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn inserts(&self) -> usize {
        self.mutations.iter().filter(|m| m.is_insert()).count()
    }

    pub fn updates(&self) -> usize {
        self.len() - self.inserts()
    }

    /// Tables that receive at least one mutation, in plan order.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        for m in &self.mutations {
            if !tables.contains(&m.table.as_str()) {
                tables.push(&m.table);
            }
        }
        tables
    }
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    kind: PlanKind,
    provenance: Provenance,
}

#[derive(Debug, Default)]
struct RowState {
    fields: Vec<(String, Slot)>,
}

impl RowState {
    fn slot_mut(&mut self, field: &str) -> Option<&mut Slot> {
        self.fields
            .iter_mut()
            .find(|(name, _)| name == field)
            .map(|(_, slot)| slot)
    }

    fn has_output(&self) -> bool {
        self.fields.iter().any(|(_, s)| s.kind == PlanKind::Output)
    }
}

#[derive(Debug, Default)]
struct TableState {
    order: Vec<RowTarget>,
    rows: HashMap<RowTarget, RowState>,
}

impl TableState {
    fn row_mut(&mut self, target: &RowTarget) -> &mut RowState {
        if !self.rows.contains_key(target) {
            self.order.push(target.clone());
        }
        self.rows.entry(target.clone()).or_default()
    }
}

/// Merges the field plans of every rule in a stage into row mutations.
///
/// Seeds (clears, insert keys, insert defaults) are applied before any rule
/// output, so a computed value always wins over a seed. Between outputs the
/// later rule wins; differing overwrites are reported as conflicts. Values
/// equal to what the snapshot already holds are dropped.
pub struct ChangePlanner<'a> {
    snapshots: &'a HashMap<String, Vec<Row>>,
}

impl<'a> ChangePlanner<'a> {
    pub fn new(snapshots: &'a HashMap<String, Vec<Row>>) -> Self {
        Self { snapshots }
    }

    pub fn plan(&self, outputs: &[RuleOutput]) -> ChangePlan {
        let mut plan = ChangePlan::default();
        let mut table_order: Vec<&str> = Vec::new();
        let mut tables: HashMap<&str, TableState> = HashMap::new();

        let mut ordered: Vec<&RuleOutput> = outputs.iter().collect();
        ordered.sort_by_key(|o| o.plans.first().map(|p| p.provenance.rule_index));

        let mut refused: HashSet<(String, RowTarget)> = HashSet::new();
        for kind in [PlanKind::Seed, PlanKind::Output] {
            for output in &ordered {
                let table = output.table.as_str();
                if !tables.contains_key(table) {
                    table_order.push(table);
                }
                let state = tables.entry(table).or_default();

                for fp in output.plans.iter().filter(|p| p.kind == kind) {
                    if fp.target.is_new() && !fp.provenance.allow_insert {
                        if refused.insert((fp.provenance.rule_name.clone(), fp.target.clone())) {
                            plan.findings.push(Finding::new_insert_not_allowed(
                                table,
                                &fp.target.to_string(),
                                &fp.provenance.rule_name,
                            ));
                        }
                        continue;
                    }
                    self.merge(table, state, fp, &mut plan);
                }
            }
        }

        for table in table_order {
            let Some(state) = tables.remove(table) else {
                continue;
            };
            self.finish_table(table, state, &mut plan);
        }

        info!(
            mutations = plan.len(),
            inserts = plan.inserts(),
            conflicts = plan.conflicts,
            "Change plan built"
        );
        plan
    }

    fn merge(&self, table: &str, state: &mut TableState, fp: &FieldPlan, plan: &mut ChangePlan) {
        let row = state.row_mut(&fp.target);
        let incoming = Slot {
            value: fp.value.clone(),
            kind: fp.kind,
            provenance: fp.provenance.clone(),
        };

        let Some(slot) = row.slot_mut(&fp.field) else {
            row.fields.push((fp.field.clone(), incoming));
            return;
        };

        if slot.kind == PlanKind::Output
            && fp.kind == PlanKind::Output
            && slot.provenance.rule_index != fp.provenance.rule_index
            && !slot.value.same_as(&fp.value)
        {
            warn!(
                table = %table,
                row = %fp.target,
                field = %fp.field,
                earlier = %slot.provenance.rule_name,
                later = %fp.provenance.rule_name,
                "Field written by two rules; later rule wins"
            );
            plan.conflicts += 1;
            plan.findings.push(Finding::new_field_conflict(
                table,
                &fp.target.to_string(),
                &fp.field,
                &slot.provenance.rule_name,
                &fp.provenance.rule_name,
            ));
        }
        *slot = incoming;
    }

    fn finish_table(&self, table: &str, mut state: TableState, plan: &mut ChangePlan) {
        let snapshot: &[Row] = self.snapshots.get(table).map(Vec::as_slice).unwrap_or(&[]);
        let by_id: HashMap<&str, (usize, &Row)> = snapshot
            .iter()
            .enumerate()
            .filter_map(|(pos, row)| row.id.as_deref().map(|id| (id, (pos, row))))
            .collect();

        // Existing rows in snapshot order, then inserts in first-planned order.
        let mut order = std::mem::take(&mut state.order);
        order.sort_by_key(|target| match target {
            RowTarget::Existing { row_id } => (0, by_id.get(row_id.as_str()).map_or(usize::MAX, |(pos, _)| *pos)),
            RowTarget::New { .. } => (1, 0),
        });

        for target in order {
            let Some(row) = state.rows.remove(&target) else {
                continue;
            };

            let kept: Vec<(String, Slot)> = match &target {
                RowTarget::Existing { row_id } => {
                    let current = by_id.get(row_id.as_str()).map(|(_, r)| *r);
                    row.fields
                        .into_iter()
                        .filter(|(field, slot)| match current {
                            Some(current) => !current.get_value(field).same_as(&slot.value),
                            None => true,
                        })
                        .collect()
                }
                RowTarget::New { .. } => {
                    if !row.has_output() {
                        debug!(table = %table, row = %target, "Dropping insert without computed fields");
                        continue;
                    }
                    row.fields
                }
            };

            if kept.is_empty() {
                continue;
            }

            let mut contributors: Vec<(usize, String)> = Vec::new();
            for (_, slot) in &kept {
                let entry = (slot.provenance.rule_index, slot.provenance.rule_name.clone());
                if !contributors.contains(&entry) {
                    contributors.push(entry);
                }
            }
            contributors.sort();

            plan.mutations.push(RowMutation {
                table: table.to_string(),
                target,
                fields: kept
                    .into_iter()
                    .map(|(name, slot)| FieldValue::new(name, slot.value))
                    .collect(),
                rules: contributors.into_iter().map(|(_, name)| name).collect(),
            });
        }
    }
}
