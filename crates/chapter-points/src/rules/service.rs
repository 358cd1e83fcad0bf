use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::execution::{trigger_id, RuleExecution, RuleTestResult};
use crate::engine::{
    ConditionChaining, ConditionResult, PointsCalculator, PointsRule, RuleId, RuleMatcher,
    RuleTrigger, RuleValidationErrors,
};
use crate::ledger::{LedgerError, PointsAward, PointsCategory, PointsLedger};
use crate::members::MemberId;
use crate::store::{
    collections, encode, natural_key, query_as, Direction, Document, DocumentStore, Query,
    StoreError,
};

/// Service composing the rule store, calculator, and points ledger.
pub struct PointsRuleService<S, L> {
    store: Arc<S>,
    ledger: Arc<L>,
    calculator: PointsCalculator,
}

impl<S, L> PointsRuleService<S, L>
where
    S: DocumentStore + 'static,
    L: PointsLedger + 'static,
{
    pub fn new(store: Arc<S>, ledger: Arc<L>, chaining: ConditionChaining) -> Self {
        Self {
            store,
            ledger,
            calculator: PointsCalculator::new(RuleMatcher::new(chaining)),
        }
    }

    /// Evaluate a rule against sample data without persisting anything.
    pub fn test_rule(&self, rule: &PointsRule, sample: &Value) -> RuleTestResult {
        if let Err(errors) = rule.validate() {
            return RuleTestResult::invalid(errors.0);
        }

        let condition_results = rule
            .conditions
            .iter()
            .map(|condition| ConditionResult::from_condition(condition, sample))
            .collect();
        let passed = self.calculator.matcher().matches(rule, sample);
        let calculation = self.calculator.calculate(std::slice::from_ref(rule), sample);

        RuleTestResult {
            passed,
            points_awarded: calculation.final_points,
            condition_results,
            calculation: Some(calculation),
            errors: Vec::new(),
        }
    }

    pub async fn create_rule(&self, mut rule: PointsRule) -> Result<PointsRule, RuleServiceError> {
        rule.validate()?;

        let data = encode(&rule)?;
        if rule.id.0.trim().is_empty() {
            let id = self.store.create(collections::RULES, data).await?;
            rule.id = RuleId(id);
        } else {
            self.store
                .create_with_id(collections::RULES, &rule.id.0, data)
                .await?;
        }

        info!(rule_id = %rule.id, trigger = rule.trigger.label(), "points rule created");
        Ok(rule)
    }

    /// Replace a rule's configuration. Past executions keep their recorded points.
    pub async fn update_rule(
        &self,
        rule_id: &RuleId,
        mut rule: PointsRule,
    ) -> Result<PointsRule, RuleServiceError> {
        rule.id = rule_id.clone();
        rule.validate()?;

        if self.store.get(collections::RULES, &rule_id.0).await?.is_none() {
            return Err(RuleServiceError::NotFound(rule_id.clone()));
        }
        self.store
            .update(collections::RULES, &rule_id.0, encode(&rule)?)
            .await?;

        info!(rule_id = %rule.id, "points rule updated");
        Ok(rule)
    }

    pub async fn get_rule(&self, rule_id: &RuleId) -> Result<PointsRule, RuleServiceError> {
        let document = self
            .store
            .get(collections::RULES, &rule_id.0)
            .await?
            .ok_or_else(|| RuleServiceError::NotFound(rule_id.clone()))?;
        Ok(document.decode()?)
    }

    pub async fn list_rules(
        &self,
        trigger: Option<RuleTrigger>,
    ) -> Result<Vec<PointsRule>, RuleServiceError> {
        let mut query = Query::all().order_by("name", Direction::Ascending);
        if let Some(trigger) = trigger {
            query = query.where_eq("trigger", trigger.label());
        }
        Ok(query_as(self.store.as_ref(), collections::RULES, &query).await?)
    }

    /// Evaluate every enabled rule for `trigger`, award points, and record executions.
    ///
    /// When the payload carries a `trigger_id`, executions are keyed by
    /// (rule, member, trigger id) and a repeated trigger is a no-op.
    pub async fn execute_rules(
        &self,
        trigger: RuleTrigger,
        trigger_data: &Value,
        member_id: &MemberId,
    ) -> Result<Vec<RuleExecution>, RuleServiceError> {
        let matched: Vec<PointsRule> = self
            .enabled_rules(trigger)
            .await?
            .into_iter()
            .filter(|rule| self.calculator.matcher().matches(rule, trigger_data))
            .collect();
        if matched.is_empty() {
            return Ok(Vec::new());
        }
        if self
            .store
            .get(collections::MEMBERS, member_id.as_str())
            .await?
            .is_none()
        {
            return Err(LedgerError::MemberNotFound(member_id.clone()).into());
        }

        let occurrence = trigger_id(trigger_data);
        let mut executions = Vec::new();

        for rule in matched {
            let mut execution = RuleExecution {
                id: String::new(),
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                member_id: member_id.clone(),
                trigger,
                trigger_id: occurrence.clone(),
                trigger_data: trigger_data.clone(),
                parameters: rule.parameters(),
                points_awarded: rule.final_points(),
                transaction_id: None,
                executed_at: Utc::now(),
            };

            let Some(id) = self.claim_execution(&execution).await? else {
                debug!(rule_id = %rule.id, %member_id, trigger_id = ?occurrence, "rule already executed for trigger");
                continue;
            };
            execution.id = id;

            if execution.points_awarded > 0 {
                let award = PointsAward::new(
                    member_id.clone(),
                    PointsCategory::from(trigger),
                    execution.points_awarded,
                    format!("{} ({})", rule.name, trigger.label()),
                )
                .related_to(execution.id.clone(), "rule_execution");
                let transaction_id = match self.ledger.award_points(award).await {
                    Ok(transaction_id) => transaction_id,
                    Err(err) => {
                        self.release_execution(&execution.id).await;
                        return Err(err.into());
                    }
                };

                let mut partial = Document::new();
                partial.insert("transaction_id".to_string(), json!(transaction_id));
                self.store
                    .update(collections::RULE_EXECUTIONS, &execution.id, partial)
                    .await?;
                execution.transaction_id = Some(transaction_id);
            }

            info!(
                rule_id = %rule.id,
                %member_id,
                points = execution.points_awarded,
                "rule executed"
            );
            executions.push(execution);
        }

        Ok(executions)
    }

    pub async fn executions_for_member(
        &self,
        member_id: &MemberId,
    ) -> Result<Vec<RuleExecution>, RuleServiceError> {
        let query = Query::all()
            .where_eq("member_id", member_id.as_str())
            .order_by("executed_at", Direction::Ascending);
        Ok(query_as(self.store.as_ref(), collections::RULE_EXECUTIONS, &query).await?)
    }

    async fn enabled_rules(&self, trigger: RuleTrigger) -> Result<Vec<PointsRule>, RuleServiceError> {
        let query = Query::all()
            .where_eq("trigger", trigger.label())
            .where_eq("enabled", true)
            .order_by("name", Direction::Ascending);
        let documents = self.store.query(collections::RULES, &query).await?;

        let mut rules = Vec::with_capacity(documents.len());
        for document in documents {
            let rule: PointsRule = match document.decode() {
                Ok(rule) => rule,
                Err(err) => {
                    warn!(rule_id = %document.id, error = %err, "skipping unreadable rule");
                    continue;
                }
            };
            if let Err(errors) = rule.validate() {
                warn!(rule_id = %rule.id, errors = %errors, "skipping invalid rule");
                continue;
            }
            rules.push(rule);
        }
        Ok(rules)
    }

    /// Drop a claim whose points were never paid so the trigger can be retried.
    async fn release_execution(&self, execution_id: &str) {
        if let Err(err) = self
            .store
            .delete(collections::RULE_EXECUTIONS, execution_id)
            .await
        {
            warn!(execution_id, error = %err, "could not release unpaid rule execution");
        }
    }

    /// Write the execution record first so concurrent triggers cannot double-award.
    async fn claim_execution(
        &self,
        execution: &RuleExecution,
    ) -> Result<Option<String>, RuleServiceError> {
        let data = encode(execution)?;
        let Some(occurrence) = &execution.trigger_id else {
            let id = self.store.create(collections::RULE_EXECUTIONS, data).await?;
            return Ok(Some(id));
        };

        let id = natural_key(&[
            execution.rule_id.0.as_str(),
            execution.member_id.as_str(),
            occurrence.as_str(),
        ]);
        if self
            .store
            .get(collections::RULE_EXECUTIONS, &id)
            .await?
            .is_some()
        {
            return Ok(None);
        }
        match self
            .store
            .create_with_id(collections::RULE_EXECUTIONS, &id, data)
            .await
        {
            Ok(()) => Ok(Some(id)),
            Err(err) if err.is_conflict() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuleServiceError {
    #[error("invalid rule: {0}")]
    Validation(#[from] RuleValidationErrors),
    #[error("rule {0} not found")]
    NotFound(RuleId),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
