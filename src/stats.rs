use crate::model::{AttendanceSession, FeeRecord, Lead, Role, User};
use serde::Serialize;
use std::collections::BTreeMap;

/// 1-decimal rounding: `floor(10*x + 0.5) / 10`.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeTotals {
    pub record_count: usize,
    pub total_amount: f64,
    pub paid_amount: f64,
    pub pending_amount: f64,
    pub students_with_pending: usize,
}

pub fn fee_totals<'a, I>(fees: I) -> FeeTotals
where
    I: IntoIterator<Item = &'a FeeRecord>,
{
    let mut t = FeeTotals::default();
    for f in fees {
        t.record_count += 1;
        t.total_amount += f.total_amount;
        t.paid_amount += f.paid_amount;
        let pending = f.pending_amount();
        t.pending_amount += pending;
        if pending > 0.0 {
            t.students_with_pending += 1;
        }
    }
    t
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub email: String,
    pub present: usize,
    pub total: usize,
    /// Percent of sessions present, 1 decimal; `None` with no sessions.
    pub rate: Option<f64>,
}

/// Per-student tallies across sessions, sorted by email.
pub fn attendance_by_student(sessions: &[AttendanceSession]) -> Vec<AttendanceSummary> {
    let mut tally: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for s in sessions {
        for e in &s.records {
            let slot = tally.entry(e.email.as_str()).or_insert((0, 0));
            slot.1 += 1;
            if e.present {
                slot.0 += 1;
            }
        }
    }
    tally
        .into_iter()
        .map(|(email, (present, total))| AttendanceSummary {
            email: email.to_string(),
            present,
            total,
            rate: attendance_rate(present, total),
        })
        .collect()
}

pub fn attendance_for(sessions: &[AttendanceSession], email: &str) -> AttendanceSummary {
    let (mut present, mut total) = (0, 0);
    for e in sessions.iter().filter_map(|s| s.entry_for(email)) {
        total += 1;
        if e.present {
            present += 1;
        }
    }
    AttendanceSummary {
        email: email.to_string(),
        present,
        total,
        rate: attendance_rate(present, total),
    }
}

fn attendance_rate(present: usize, total: usize) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some(round_off_1_decimal(100.0 * present as f64 / total as f64))
}

/// Overall present rate across every entry of every session.
pub fn overall_attendance_rate(sessions: &[AttendanceSession]) -> Option<f64> {
    let entries = sessions.iter().flat_map(|s| s.records.iter());
    let (present, total) = entries.fold((0, 0), |(p, t), e| (p + usize::from(e.present), t + 1));
    attendance_rate(present, total)
}

pub fn lead_counts(leads: &[Lead]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for l in leads {
        *counts.entry(l.status.as_str().to_string()).or_insert(0) += 1;
    }
    counts
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCounts {
    pub total: usize,
    pub pending_approval: usize,
    pub profile_incomplete: usize,
    pub by_role: BTreeMap<String, usize>,
}

pub fn user_counts(users: &[User]) -> UserCounts {
    let mut c = UserCounts::default();
    for role in Role::ALL {
        c.by_role.insert(role.as_str().to_string(), 0);
    }
    for u in users {
        c.total += 1;
        if !u.approved {
            c.pending_approval += 1;
        }
        if !u.profile_completed {
            c.profile_incomplete += 1;
        }
        *c.by_role.entry(u.role.as_str().to_string()).or_insert(0) += 1;
    }
    c
}
