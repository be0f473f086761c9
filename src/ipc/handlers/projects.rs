use crate::ipc::helpers::{
    get_optional_str, get_required_str, now_rfc3339, open_workspace, respond, HandlerErr, Store,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{normalize_email, Project, Role};
use crate::roles::ViewId;
use serde_json::{json, Map, Value};
use uuid::Uuid;

fn load_project(store: &Store, id: &str) -> Result<Project, HandlerErr> {
    store
        .try_find::<Project>(id)?
        .ok_or_else(|| HandlerErr::not_found("project not found"))
}

fn projects_list(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    let current = session.authorize(ViewId::Projects)?;
    let requested = get_optional_str(params, "studentEmail")?.map(|e| normalize_email(&e));

    let filter = if current.role == Role::Student {
        if requested.as_deref().is_some_and(|e| e != current.email) {
            return Err(HandlerErr::forbidden("students can only list their own projects"));
        }
        Some(current.email.clone())
    } else {
        requested
    };

    let projects: Vec<Project> = store
        .load::<Project>()
        .into_iter()
        .filter(|p| filter.as_deref().map_or(true, |e| p.student_email == e))
        .collect();
    Ok(json!({ "projects": projects }))
}

fn projects_create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    let current = session.authorize(ViewId::Projects)?;
    let title = get_required_str(params, "title")?;
    let student_email = match current.role {
        Role::Student => current.email.clone(),
        _ => normalize_email(&get_required_str(params, "studentEmail")?),
    };

    let project = Project {
        id: Uuid::new_v4().to_string(),
        student_email,
        title,
        description: get_optional_str(params, "description")?,
        deploy_link: None,
        grade: None,
        feedback: None,
        submitted_at: None,
        graded_at: None,
        extra: Map::new(),
    };
    store.save(&project)?;
    Ok(json!({ "project": project }))
}

fn projects_submit(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    let current = session.authorize(ViewId::Projects)?;
    let id = get_required_str(params, "id")?;
    let link = get_required_str(params, "deployLink")?;
    if !(link.starts_with("http://") || link.starts_with("https://")) {
        return Err(HandlerErr::bad_params("deployLink must be an http(s) URL"));
    }

    let mut project = load_project(store, &id)?;
    if project.student_email != current.email {
        return Err(HandlerErr::forbidden("only the owning student can submit"));
    }
    project.deploy_link = Some(link);
    project.submitted_at = Some(now_rfc3339());
    store.save(&project)?;
    Ok(json!({ "project": project }))
}

fn projects_grade(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    let current = session.authorize(ViewId::Projects)?;
    if !matches!(current.role, Role::Admin | Role::Instructor) {
        return Err(HandlerErr::forbidden("only instructors and admins grade projects"));
    }
    let id = get_required_str(params, "id")?;
    let grade = match params.get("grade") {
        Some(Value::Number(n)) => n.to_string(),
        _ => get_required_str(params, "grade")?,
    };

    let mut project = load_project(store, &id)?;
    project.grade = Some(grade);
    if let Some(feedback) = get_optional_str(params, "feedback")? {
        project.feedback = Some(feedback);
    }
    project.graded_at = Some(now_rfc3339());
    store.save(&project)?;
    Ok(json!({ "project": project }))
}

fn projects_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    let current = session.authorize(ViewId::Projects)?;
    let id = get_required_str(params, "id")?;
    let project = load_project(store, &id)?;
    let staff = matches!(current.role, Role::Admin | Role::Instructor);
    if !staff && project.student_email != current.email {
        return Err(HandlerErr::forbidden("cannot delete another student's project"));
    }
    let deleted = store.remove::<Project>(&id)?;
    Ok(json!({ "deleted": deleted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "projects.list" => Some(respond(state, req, projects_list)),
        "projects.create" => Some(respond(state, req, projects_create)),
        "projects.submit" => Some(respond(state, req, projects_submit)),
        "projects.grade" => Some(respond(state, req, projects_grade)),
        "projects.delete" => Some(respond(state, req, projects_delete)),
        _ => None,
    }
}
