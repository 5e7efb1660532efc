use crate::condition::compare::{Comparand, Operand, compare};
use model::{
    records::row::Row,
    rules::condition::{Condition, Operator},
};

/// A condition with its comparison value interpreted ahead of evaluation.
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    pub field: String,
    pub operator: Operator,
    comparand: Comparand,
}

impl CompiledCondition {
    pub fn compile(condition: &Condition) -> Self {
        Self {
            field: condition.field.clone(),
            operator: condition.operator,
            comparand: Comparand::new(condition.value.clone()),
        }
    }

    /// A row without the field never satisfies the condition.
    pub fn evaluate(&self, row: &Row) -> bool {
        match row.value(&self.field) {
            Some(value) => compare(&Operand::new(value), self.operator, &self.comparand),
            None => false,
        }
    }
}

/// Inclusion conditions are AND-combined, exclusions OR-combined.
#[derive(Debug, Clone, Default)]
pub struct ConditionEvaluator {
    include: Vec<CompiledCondition>,
    exclude: Vec<CompiledCondition>,
}

impl ConditionEvaluator {
    pub fn new(conditions: &[Condition], exclude_conditions: &[Condition]) -> Self {
        Self {
            include: conditions.iter().map(CompiledCondition::compile).collect(),
            exclude: exclude_conditions
                .iter()
                .map(CompiledCondition::compile)
                .collect(),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.include.iter().all(|c| c.evaluate(row))
    }

    pub fn excluded(&self, row: &Row) -> bool {
        self.exclude.iter().any(|c| c.evaluate(row))
    }

    pub fn keeps(&self, row: &Row) -> bool {
        self.matches(row) && !self.excluded(row)
    }

    pub fn is_trivial(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

pub fn matches(row: &Row, conditions: &[Condition]) -> bool {
    ConditionEvaluator::new(conditions, &[]).matches(row)
}

pub fn excluded(row: &Row, exclude_conditions: &[Condition]) -> bool {
    ConditionEvaluator::new(&[], exclude_conditions).excluded(row)
}
