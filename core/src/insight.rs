//! Selection insight: what the canonical set knows about a selected record.
//!
//! Selection never mutates the canonical set. It only counts neighbours
//! and bumps the activity counter.

use crate::{transaction::Transaction, types::TxnId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionInsight {
    pub transaction_id: TxnId,
    pub same_merchant: usize,
    pub same_category: usize,
    pub same_user: usize,
    /// Records sharing at least one of merchant, category, or user.
    pub related_count: usize,
    pub selected_at: DateTime<Utc>,
    /// Selections made so far in this session, this one included.
    pub selection_count: u64,
}

impl SelectionInsight {
    /// Count the selected record's neighbours. The record itself is
    /// excluded by id.
    pub fn compute(
        selected: &Transaction,
        records: &[Transaction],
        selection_count: u64,
        selected_at: DateTime<Utc>,
    ) -> Self {
        let mut insight = Self {
            transaction_id: selected.id.clone(),
            same_merchant: 0,
            same_category: 0,
            same_user: 0,
            related_count: 0,
            selected_at,
            selection_count,
        };

        for r in records.iter().filter(|r| r.id != selected.id) {
            let merchant = r.merchant_name == selected.merchant_name;
            let category = r.category == selected.category;
            let user = r.user_id == selected.user_id;
            insight.same_merchant += merchant as usize;
            insight.same_category += category as usize;
            insight.same_user += user as usize;
            if merchant || category || user {
                insight.related_count += 1;
            }
        }
        insight
    }
}
