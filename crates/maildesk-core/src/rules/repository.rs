use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::account::AccountId;
use crate::error::{Error, Result};
use crate::message::normalize_label_set;
use crate::rules::model::{Action, Condition, Rule, RuleId};

const RULE_COLUMNS: &str =
    "id, account_id, name, priority, stop_on_first_match, is_enabled, conditions, actions";

/// Evaluation order: an account's own rules before global ones, higher
/// priority first, name as the tiebreak.
const EVALUATION_ORDER: &str = "ORDER BY CASE WHEN account_id IS NULL THEN 1 ELSE 0 END ASC, \
     priority DESC, name ASC";

/// `SQLite`-backed storage for triage rules.
pub struct RuleRepository {
    pool: SqlitePool,
}

impl RuleRepository {
    pub(crate) const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetches a rule by id.
    ///
    /// # Errors
    /// Returns an error if the query or row decoding fails.
    pub async fn get(&self, id: RuleId) -> Result<Option<Rule>> {
        let sql = format!("SELECT {RULE_COLUMNS} FROM rules WHERE id = ?");
        let row = sqlx::query(&sql).bind(id.0).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_rule).transpose()
    }

    /// Lists every rule in evaluation order.
    ///
    /// # Errors
    /// Returns an error if the query or row decoding fails.
    pub async fn list(&self) -> Result<Vec<Rule>> {
        let sql = format!("SELECT {RULE_COLUMNS} FROM rules {EVALUATION_ORDER}");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_rule).collect()
    }

    /// Enabled rules that apply to an account, in evaluation order.
    ///
    /// # Errors
    /// Returns an error if the query or row decoding fails.
    pub async fn list_for_account(&self, account_id: AccountId) -> Result<Vec<Rule>> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM rules \
             WHERE is_enabled = 1 AND (account_id = ? OR account_id IS NULL) {EVALUATION_ORDER}"
        );
        let rows = sqlx::query(&sql)
            .bind(account_id.0)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_rule).collect()
    }

    /// Inserts or updates a rule, filling in `rule.id` on insert.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] for a malformed rule, or a database
    /// error.
    pub async fn save(&self, rule: &mut Rule) -> Result<()> {
        validate_rule(rule)?;
        let conditions = serde_json::to_string(&rule.conditions)?;
        let actions = serde_json::to_string(&rule.actions)?;

        if let Some(id) = rule.id {
            let result = sqlx::query(
                "UPDATE rules SET account_id = ?, name = ?, priority = ?, \
                     stop_on_first_match = ?, is_enabled = ?, conditions = ?, actions = ?, \
                     updated_at = CURRENT_TIMESTAMP \
                 WHERE id = ?",
            )
            .bind(rule.account_id.map(|account_id| account_id.0))
            .bind(&rule.name)
            .bind(rule.priority)
            .bind(rule.stop_on_first_match)
            .bind(rule.is_enabled)
            .bind(&conditions)
            .bind(&actions)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(Error::RuleNotFound(id.to_string()));
            }
        } else {
            let result = sqlx::query(
                "INSERT INTO rules (account_id, name, priority, stop_on_first_match, \
                     is_enabled, conditions, actions) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(rule.account_id.map(|account_id| account_id.0))
            .bind(&rule.name)
            .bind(rule.priority)
            .bind(rule.stop_on_first_match)
            .bind(rule.is_enabled)
            .bind(&conditions)
            .bind(&actions)
            .execute(&self.pool)
            .await?;
            rule.id = Some(RuleId::new(result.last_insert_rowid()));
        }
        Ok(())
    }

    /// Enables or disables a rule.
    ///
    /// # Errors
    /// Returns [`Error::RuleNotFound`] for an unknown id, or a database
    /// error.
    pub async fn set_enabled(&self, id: RuleId, enabled: bool) -> Result<()> {
        let result = sqlx::query(
            "UPDATE rules SET is_enabled = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(enabled)
        .bind(id.0)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::RuleNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Deletes a rule.
    ///
    /// # Errors
    /// Returns [`Error::RuleNotFound`] for an unknown id, or a database
    /// error.
    pub async fn delete(&self, id: RuleId) -> Result<()> {
        let result = sqlx::query("DELETE FROM rules WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::RuleNotFound(id.to_string()));
        }
        Ok(())
    }
}

fn validate_rule(rule: &Rule) -> Result<()> {
    if rule.name.trim().is_empty() {
        return Err(Error::Validation("rule name cannot be empty".to_string()));
    }
    if rule.actions.is_empty() {
        return Err(Error::Validation(
            "rule needs at least one action".to_string(),
        ));
    }
    for condition in &rule.conditions {
        match condition {
            Condition::FieldEquals { value, .. } | Condition::FieldContains { value, .. } => {
                if value.trim().is_empty() {
                    return Err(Error::Validation(
                        "condition value cannot be empty".to_string(),
                    ));
                }
            }
            Condition::LabelOverlap { labels } => {
                if normalize_label_set(labels.iter().cloned()).is_empty() {
                    return Err(Error::Validation(
                        "label condition needs at least one label".to_string(),
                    ));
                }
            }
            Condition::DateRange { from, to } => {
                if from.is_none() && to.is_none() {
                    return Err(Error::Validation(
                        "date range needs at least one bound".to_string(),
                    ));
                }
                if let (Some(from), Some(to)) = (from, to)
                    && from >= to
                {
                    return Err(Error::Validation("date range is empty".to_string()));
                }
            }
            Condition::FlagIs { .. } => {}
        }
    }
    for action in &rule.actions {
        if let Action::AddLabels { labels } | Action::RemoveLabels { labels } = action
            && normalize_label_set(labels.iter().cloned()).is_empty()
        {
            return Err(Error::Validation(
                "label action needs at least one label".to_string(),
            ));
        }
    }
    Ok(())
}

fn row_to_rule(row: &SqliteRow) -> Result<Rule> {
    let conditions: Vec<Condition> = serde_json::from_str(&row.get::<String, _>("conditions"))?;
    let actions: Vec<Action> = serde_json::from_str(&row.get::<String, _>("actions"))?;
    Ok(Rule {
        id: Some(RuleId::new(row.get("id"))),
        account_id: row.get::<Option<i64>, _>("account_id").map(AccountId::new),
        name: row.get("name"),
        priority: row.get("priority"),
        stop_on_first_match: row.get::<i64, _>("stop_on_first_match") != 0,
        is_enabled: row.get::<i64, _>("is_enabled") != 0,
        conditions,
        actions,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::FlagKind;
    use crate::rules::model::MessageField;
    use crate::store::Store;

    fn labeled_rule(name: &str) -> Rule {
        let mut rule = Rule::new(name);
        rule.actions = vec![Action::AddLabels {
            labels: vec!["billing".to_string()],
        }];
        rule
    }

    #[tokio::test]
    async fn save_round_trips_conditions_and_actions() {
        let store = Store::in_memory().await.unwrap();
        let repo = store.rules();

        let mut rule = Rule::new("invoices");
        rule.account_id = Some(AccountId::new(1));
        rule.priority = 5;
        rule.stop_on_first_match = true;
        rule.conditions = vec![
            Condition::FieldContains {
                field: MessageField::Subject,
                value: "invoice".to_string(),
            },
            Condition::FlagIs {
                flag: FlagKind::Spam,
                value: false,
            },
        ];
        rule.actions = vec![
            Action::AddLabels {
                labels: vec!["billing".to_string()],
            },
            Action::Notify,
        ];
        repo.save(&mut rule).await.unwrap();

        let stored = repo.get(rule.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.name, "invoices");
        assert_eq!(stored.conditions.len(), 2);
        assert!(matches!(stored.actions[1], Action::Notify));
        assert!(stored.stop_on_first_match);
    }

    #[tokio::test]
    async fn evaluation_order_puts_account_rules_first() {
        let store = Store::in_memory().await.unwrap();
        let repo = store.rules();
        let account_id = AccountId::new(1);

        let mut global = labeled_rule("global catch-all");
        global.priority = 100;
        repo.save(&mut global).await.unwrap();

        let mut low = labeled_rule("account low");
        low.account_id = Some(account_id);
        low.priority = 1;
        repo.save(&mut low).await.unwrap();

        let mut high = labeled_rule("account high");
        high.account_id = Some(account_id);
        high.priority = 9;
        repo.save(&mut high).await.unwrap();

        let names: Vec<String> = repo
            .list_for_account(account_id)
            .await
            .unwrap()
            .into_iter()
            .map(|rule| rule.name)
            .collect();
        assert_eq!(names, ["account high", "account low", "global catch-all"]);
    }

    #[tokio::test]
    async fn other_accounts_do_not_see_foreign_rules() {
        let store = Store::in_memory().await.unwrap();
        let repo = store.rules();

        let mut mine = labeled_rule("mine");
        mine.account_id = Some(AccountId::new(1));
        repo.save(&mut mine).await.unwrap();

        let visible = repo.list_for_account(AccountId::new(2)).await.unwrap();
        assert!(visible.is_empty());
    }

    #[tokio::test]
    async fn disabled_rules_are_not_listed_for_evaluation() {
        let store = Store::in_memory().await.unwrap();
        let repo = store.rules();

        let mut rule = labeled_rule("paused");
        repo.save(&mut rule).await.unwrap();
        repo.set_enabled(rule.id.unwrap(), false).await.unwrap();

        assert!(repo.list_for_account(AccountId::new(1)).await.unwrap().is_empty());
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn validation_rejects_malformed_rules() {
        let store = Store::in_memory().await.unwrap();
        let repo = store.rules();

        let mut nameless = labeled_rule("  ");
        assert!(matches!(
            repo.save(&mut nameless).await.unwrap_err(),
            Error::Validation(_)
        ));

        let mut actionless = Rule::new("no actions");
        assert!(matches!(
            repo.save(&mut actionless).await.unwrap_err(),
            Error::Validation(_)
        ));

        let mut blank_value = labeled_rule("blank condition");
        blank_value.conditions = vec![Condition::FieldContains {
            field: MessageField::Subject,
            value: "   ".to_string(),
        }];
        assert!(matches!(
            repo.save(&mut blank_value).await.unwrap_err(),
            Error::Validation(_)
        ));

        let mut unbounded = labeled_rule("unbounded range");
        unbounded.conditions = vec![Condition::DateRange {
            from: None,
            to: None,
        }];
        assert!(matches!(
            repo.save(&mut unbounded).await.unwrap_err(),
            Error::Validation(_)
        ));
    }

    #[tokio::test]
    async fn delete_unknown_rule_is_not_found() {
        let store = Store::in_memory().await.unwrap();
        let err = store.rules().delete(RuleId::new(41)).await.unwrap_err();
        assert!(matches!(err, Error::RuleNotFound(_)));
    }
}
