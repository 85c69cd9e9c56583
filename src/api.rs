//! REST API server for the finance tracker
//!
//! Records, dashboard figures and the assistant pipeline over JSON. Every
//! body is wrapped in `ApiResponse`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::assistant::{Assistant, ConfirmationDecision};
use crate::error::AssistantError;
use crate::insights::{
    self, distinct_categories, filter_transactions, BudgetReport, DashboardSummary, GoalsReport,
    TransactionQuery,
};
use crate::models::{BudgetItem, NewTransaction, SavingGoal, TransactionPatch};
use crate::planning::PlanKind;
use crate::Result;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub occupation: Option<String>,
    pub expected_salary: Option<f64>,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyKeyRequest {
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContributionRequest {
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct StartPlanRequest {
    pub kind: PlanKind,
}

#[derive(Debug, Deserialize)]
pub struct PlanAnswerRequest {
    pub answer: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

pub fn status_for(error: &AssistantError) -> StatusCode {
    match error {
        AssistantError::NotFound(_) => StatusCode::NOT_FOUND,
        AssistantError::InvalidInput(_) | AssistantError::UuidError(_) => StatusCode::BAD_REQUEST,
        AssistantError::MissingApiKey => StatusCode::PRECONDITION_FAILED,
        AssistantError::ConfirmationPending
        | AssistantError::StaleConfirmation(_)
        | AssistantError::NoPendingConfirmation
        | AssistantError::NothingToUndo
        | AssistantError::PlanNotActive(_) => StatusCode::CONFLICT,
        AssistantError::LlmError(_)
        | AssistantError::InvalidModelReply(_)
        | AssistantError::HttpError(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T: Serialize>(result: Result<T>) -> ApiResult {
    respond_with(StatusCode::OK, result)
}

fn respond_with<T: Serialize>(ok_status: StatusCode, result: Result<T>) -> ApiResult {
    match result {
        Ok(data) => (ok_status, Json(ApiResponse::success(data))),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                warn!(%status, error = %e, "Request failed");
            }
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub assistant: Arc<Assistant>,
}

/// =============================
/// Path Ids
/// =============================

pub fn stable_uuid_from_string(input: &str) -> Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

/// Login names and other free-text user ids map to a fixed UUID
pub fn parse_or_stable_uuid(value: &str) -> Uuid {
    let trimmed = value.trim();
    Uuid::parse_str(trimmed).unwrap_or_else(|_| stable_uuid_from_string(trimmed))
}

fn parse_record_id(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value.trim())
        .map_err(|_| AssistantError::InvalidInput(format!("invalid transaction id: {}", value)))
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Profile
/// =============================

async fn get_profile(State(state): State<ApiState>, Path(user): Path<String>) -> ApiResult {
    let user_id = parse_or_stable_uuid(&user);
    respond(state.assistant.store().load_profile(user_id).await)
}

async fn update_profile(
    State(state): State<ApiState>,
    Path(user): Path<String>,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult {
    let user_id = parse_or_stable_uuid(&user);
    let store = state.assistant.store();

    let result = async move {
        let mut profile = store.load_profile(user_id).await?;
        if let Some(name) = update.name {
            profile.name = name;
        }
        if let Some(email) = update.email {
            profile.email = email;
        }
        if let Some(occupation) = update.occupation {
            profile.occupation = Some(occupation).filter(|o| !o.trim().is_empty());
        }
        if let Some(salary) = update.expected_salary {
            profile.expected_salary = Some(salary).filter(|s| *s > 0.0);
        }
        if let Some(key) = update.api_key {
            profile.api_key = Some(key.trim().to_string()).filter(|k| !k.is_empty());
        }
        store.save_profile(&profile).await?;
        Ok::<_, AssistantError>(profile)
    }
    .await;

    respond(result)
}

async fn verify_api_key(
    State(state): State<ApiState>,
    Path(user): Path<String>,
    Json(req): Json<VerifyKeyRequest>,
) -> ApiResult {
    let user_id = parse_or_stable_uuid(&user);
    let assistant = &state.assistant;

    let result = async move {
        let key = match req.api_key {
            Some(key) => key,
            None => assistant
                .store()
                .load_profile(user_id)
                .await?
                .api_key
                .unwrap_or_default(),
        };
        let valid = assistant.model().verify_key(&key).await?;
        info!(user_id = %user_id, valid, "API key verified");
        Ok::<_, AssistantError>(serde_json::json!({ "valid": valid }))
    }
    .await;

    respond(result)
}

/// =============================
/// Transactions
/// =============================

async fn list_transactions(
    State(state): State<ApiState>,
    Path(user): Path<String>,
    Query(query): Query<TransactionQuery>,
) -> ApiResult {
    let user_id = parse_or_stable_uuid(&user);
    let result = state
        .assistant
        .store()
        .list_transactions(user_id)
        .await
        .map(|records| {
            serde_json::json!({
                "transactions": filter_transactions(&records, &query),
                "categories": distinct_categories(&records),
            })
        });
    respond(result)
}

async fn create_transaction(
    State(state): State<ApiState>,
    Path(user): Path<String>,
    Json(mut new): Json<NewTransaction>,
) -> ApiResult {
    let user_id = parse_or_stable_uuid(&user);

    new.description = new.description.trim().to_string();
    new.category = new.category.trim().to_string();
    if new.description.is_empty() || new.category.is_empty() {
        return respond::<()>(Err(AssistantError::InvalidInput(
            "description and category are required".to_string(),
        )));
    }
    if !new.amount.is_finite() || new.amount <= 0.0 {
        return respond::<()>(Err(AssistantError::InvalidInput(
            "amount must be positive".to_string(),
        )));
    }

    respond_with(
        StatusCode::CREATED,
        state.assistant.store().insert_transaction(user_id, new).await,
    )
}

async fn get_transaction(
    State(state): State<ApiState>,
    Path((user, id)): Path<(String, String)>,
) -> ApiResult {
    let user_id = parse_or_stable_uuid(&user);
    let result = async {
        let id = parse_record_id(&id)?;
        state
            .assistant
            .store()
            .get_transaction(user_id, id)
            .await?
            .ok_or_else(|| AssistantError::NotFound(format!("transaction {}", id)))
    }
    .await;
    respond(result)
}

async fn update_transaction(
    State(state): State<ApiState>,
    Path((user, id)): Path<(String, String)>,
    Json(patch): Json<TransactionPatch>,
) -> ApiResult {
    let user_id = parse_or_stable_uuid(&user);
    let result = async {
        let id = parse_record_id(&id)?;
        if patch.is_empty() {
            return Err(AssistantError::InvalidInput("nothing to update".to_string()));
        }
        if patch.amount.map_or(false, |a| !a.is_finite() || a <= 0.0) {
            return Err(AssistantError::InvalidInput("amount must be positive".to_string()));
        }
        state.assistant.store().update_transaction(user_id, id, &patch).await
    }
    .await;
    respond(result)
}

async fn delete_transaction(
    State(state): State<ApiState>,
    Path((user, id)): Path<(String, String)>,
) -> ApiResult {
    let user_id = parse_or_stable_uuid(&user);
    let result = async {
        let id = parse_record_id(&id)?;
        if state.assistant.store().delete_transaction(user_id, id).await? {
            Ok(serde_json::json!({ "deleted": id }))
        } else {
            Err(AssistantError::NotFound(format!("transaction {}", id)))
        }
    }
    .await;
    respond(result)
}

async fn summary(State(state): State<ApiState>, Path(user): Path<String>) -> ApiResult {
    let user_id = parse_or_stable_uuid(&user);
    let result = state
        .assistant
        .store()
        .list_transactions(user_id)
        .await
        .map(|records| DashboardSummary::compute(&records));
    respond(result)
}

/// =============================
/// Budget & Goals
/// =============================

async fn get_budget(State(state): State<ApiState>, Path(user): Path<String>) -> ApiResult {
    let user_id = parse_or_stable_uuid(&user);
    respond(state.assistant.store().load_budget(user_id).await)
}

async fn put_budget(
    State(state): State<ApiState>,
    Path(user): Path<String>,
    Json(items): Json<Vec<BudgetItem>>,
) -> ApiResult {
    let user_id = parse_or_stable_uuid(&user);
    let result = state
        .assistant
        .store()
        .save_budget(user_id, &items)
        .await
        .map(|_| items);
    respond(result)
}

async fn budget_report(State(state): State<ApiState>, Path(user): Path<String>) -> ApiResult {
    let user_id = parse_or_stable_uuid(&user);
    let assistant = &state.assistant;
    let result = async {
        let items = assistant.store().load_budget(user_id).await?;
        let records = assistant.store().list_transactions(user_id).await?;
        Ok::<_, AssistantError>(BudgetReport::compute(&items, &records, assistant.today()))
    }
    .await;
    respond(result)
}

async fn get_goals(State(state): State<ApiState>, Path(user): Path<String>) -> ApiResult {
    let user_id = parse_or_stable_uuid(&user);
    let result = state
        .assistant
        .store()
        .load_saving_goals(user_id)
        .await
        .map(|goals| {
            serde_json::json!({
                "report": GoalsReport::compute(&goals),
                "goals": goals,
            })
        });
    respond(result)
}

async fn put_goals(
    State(state): State<ApiState>,
    Path(user): Path<String>,
    Json(goals): Json<Vec<SavingGoal>>,
) -> ApiResult {
    let user_id = parse_or_stable_uuid(&user);
    let result = state
        .assistant
        .store()
        .save_saving_goals(user_id, &goals)
        .await
        .map(|_| goals);
    respond(result)
}

async fn contribute(
    State(state): State<ApiState>,
    Path((user, index)): Path<(String, usize)>,
    Json(req): Json<ContributionRequest>,
) -> ApiResult {
    let user_id = parse_or_stable_uuid(&user);
    let assistant = &state.assistant;
    respond(
        insights::contribute(
            assistant.store().as_ref(),
            user_id,
            index,
            req.amount,
            assistant.today(),
            chrono::Utc::now(),
        )
        .await,
    )
}

/// =============================
/// Assistant
/// =============================

async fn start_chat(State(state): State<ApiState>, Path(user): Path<String>) -> ApiResult {
    respond(state.assistant.start_chat(parse_or_stable_uuid(&user)).await)
}

async fn send_message(
    State(state): State<ApiState>,
    Path(user): Path<String>,
    Json(req): Json<MessageRequest>,
) -> ApiResult {
    let user_id = parse_or_stable_uuid(&user);
    info!(user_id = %user_id, "Assistant message received");
    respond(state.assistant.handle_message(user_id, &req.message).await)
}

async fn confirm(
    State(state): State<ApiState>,
    Path(user): Path<String>,
    Json(decision): Json<ConfirmationDecision>,
) -> ApiResult {
    respond(state.assistant.confirm(parse_or_stable_uuid(&user), decision).await)
}

async fn undo(State(state): State<ApiState>, Path(user): Path<String>) -> ApiResult {
    respond(state.assistant.undo(parse_or_stable_uuid(&user)).await)
}

async fn get_analysis(State(state): State<ApiState>, Path(user): Path<String>) -> ApiResult {
    respond(state.assistant.analysis(parse_or_stable_uuid(&user)).await)
}

async fn generate_analysis(State(state): State<ApiState>, Path(user): Path<String>) -> ApiResult {
    respond(state.assistant.generate_analysis(parse_or_stable_uuid(&user)).await)
}

async fn start_plan(
    State(state): State<ApiState>,
    Path(user): Path<String>,
    Json(req): Json<StartPlanRequest>,
) -> ApiResult {
    respond(state.assistant.start_plan(parse_or_stable_uuid(&user), req.kind).await)
}

async fn answer_plan(
    State(state): State<ApiState>,
    Path(user): Path<String>,
    Json(req): Json<PlanAnswerRequest>,
) -> ApiResult {
    respond(
        state
            .assistant
            .answer_plan(parse_or_stable_uuid(&user), &req.answer)
            .await,
    )
}

async fn save_plan(State(state): State<ApiState>, Path(user): Path<String>) -> ApiResult {
    respond(state.assistant.save_plan(parse_or_stable_uuid(&user)).await)
}

/// =============================
/// Router
/// =============================

pub fn create_router(assistant: Arc<Assistant>) -> Router {
    let state = ApiState { assistant };

    Router::new()
        .route("/health", get(health))
        .route("/api/users/:user/profile", get(get_profile).put(update_profile))
        .route("/api/users/:user/api-key/verify", post(verify_api_key))
        .route(
            "/api/users/:user/transactions",
            get(list_transactions).post(create_transaction),
        )
        .route(
            "/api/users/:user/transactions/:id",
            get(get_transaction)
                .patch(update_transaction)
                .delete(delete_transaction),
        )
        .route("/api/users/:user/summary", get(summary))
        .route("/api/users/:user/budget", get(get_budget).put(put_budget))
        .route("/api/users/:user/budget/report", get(budget_report))
        .route("/api/users/:user/goals", get(get_goals).put(put_goals))
        .route("/api/users/:user/goals/:index/contribute", post(contribute))
        .route("/api/users/:user/assistant/chat/start", post(start_chat))
        .route("/api/users/:user/assistant/messages", post(send_message))
        .route("/api/users/:user/assistant/confirm", post(confirm))
        .route("/api/users/:user/assistant/undo", post(undo))
        .route(
            "/api/users/:user/assistant/analysis",
            get(get_analysis).post(generate_analysis),
        )
        .route("/api/users/:user/assistant/plans", post(start_plan))
        .route("/api/users/:user/assistant/plans/answer", post(answer_plan))
        .route("/api/users/:user/assistant/plans/save", post(save_plan))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    assistant: Arc<Assistant>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(assistant);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_uuid_is_deterministic() {
        let a = parse_or_stable_uuid("vivek-paliwal");
        assert_eq!(a, parse_or_stable_uuid(" vivek-paliwal "));
        assert_ne!(a, parse_or_stable_uuid("someone-else"));
        assert_eq!(a.get_version_num(), 4);

        let explicit = Uuid::new_v4();
        assert_eq!(parse_or_stable_uuid(&explicit.to_string()), explicit);
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_for(&AssistantError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&AssistantError::MissingApiKey), StatusCode::PRECONDITION_FAILED);
        assert_eq!(status_for(&AssistantError::ConfirmationPending), StatusCode::CONFLICT);
        assert_eq!(status_for(&AssistantError::LlmError("down".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_for(&AssistantError::DatabaseError("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_response_shape() {
        let (status, Json(body)) = respond::<()>(Err(AssistantError::InvalidInput("bad".into())));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.success);
        assert_eq!(body.error.as_deref(), Some("Invalid input: bad"));
    }
}
