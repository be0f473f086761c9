use crate::ipc::helpers::{
    get_optional_amount, get_optional_str, get_required_amount, get_required_str, now_rfc3339,
    open_workspace, respond, to_json, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{normalize_email, FeeRecord, Payment};
use crate::roles::{can_access, ViewId};
use crate::stats;
use serde_json::{json, Map, Value};
use tracing::info;

/// Fee record as returned to callers, with the derived pending amount.
fn fee_view(fee: &FeeRecord) -> Result<Value, HandlerErr> {
    let mut v = to_json(fee)?;
    v["pendingAmount"] = json!(fee.pending_amount());
    Ok(v)
}

fn fees_list(state: &mut AppState, _params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    session.authorize(ViewId::Fees)?;
    let fees = store.load::<FeeRecord>();
    let rows = fees.iter().map(fee_view).collect::<Result<Vec<_>, _>>()?;
    Ok(json!({
        "fees": rows,
        "totals": stats::fee_totals(&fees)
    }))
}

/// Staff with the fees view may read any record; anyone else only their own.
fn fees_get(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    let current = session.require_login()?;
    let requested = get_optional_str(params, "studentEmail")?.map(|e| normalize_email(&e));
    let email = match requested {
        Some(e) if e != current.email && !can_access(current.role, ViewId::Fees) => {
            return Err(HandlerErr::forbidden("cannot view another student's fees"));
        }
        Some(e) => e,
        None => current.email.clone(),
    };
    let fee = store.find::<FeeRecord>(&email);
    Ok(json!({
        "fee": fee.as_ref().map(fee_view).transpose()?
    }))
}

fn fees_set(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    session.authorize(ViewId::Fees)?;
    let email = normalize_email(&get_required_str(params, "studentEmail")?);
    let total = get_required_amount(params, "totalAmount")?;
    let paid = get_optional_amount(params, "paidAmount")?;
    let due_date = get_optional_str(params, "dueDate")?;

    let fee = match store.try_find::<FeeRecord>(&email)? {
        Some(mut existing) => {
            existing.total_amount = total;
            if let Some(p) = paid {
                existing.paid_amount = p;
            }
            if due_date.is_some() {
                existing.due_date = due_date;
            }
            existing
        }
        None => FeeRecord {
            student_email: email.clone(),
            total_amount: total,
            paid_amount: paid.unwrap_or(0.0),
            payments: Vec::new(),
            due_date,
            extra: Map::new(),
        },
    };
    store.save(&fee)?;
    Ok(json!({ "fee": fee_view(&fee)? }))
}

fn fees_record_payment(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    let actor = session.authorize(ViewId::Fees)?.email.clone();
    let email = normalize_email(&get_required_str(params, "studentEmail")?);
    let amount = get_required_amount(params, "amount")?;
    if amount <= 0.0 {
        return Err(HandlerErr::bad_params("amount must be > 0"));
    }

    let mut fee = store
        .try_find::<FeeRecord>(&email)?
        .ok_or_else(|| HandlerErr::not_found("no fee record for student"))?;
    fee.paid_amount += amount;
    fee.payments.push(Payment {
        amount,
        paid_at: now_rfc3339(),
        note: get_optional_str(params, "note")?,
    });
    store.save(&fee)?;
    info!(student = %email, amount, by = %actor, "payment recorded");
    Ok(json!({ "fee": fee_view(&fee)? }))
}

fn fees_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    session.authorize(ViewId::Fees)?;
    let email = normalize_email(&get_required_str(params, "studentEmail")?);
    let deleted = store.remove::<FeeRecord>(&email)?;
    Ok(json!({ "deleted": deleted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "fees.list" => Some(respond(state, req, fees_list)),
        "fees.get" => Some(respond(state, req, fees_get)),
        "fees.set" => Some(respond(state, req, fees_set)),
        "fees.recordPayment" => Some(respond(state, req, fees_record_payment)),
        "fees.delete" => Some(respond(state, req, fees_delete)),
        _ => None,
    }
}
