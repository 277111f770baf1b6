use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use log::info;
use shared::HealthResponse;
use uuid::Uuid;

use crate::error::ApiError;
use crate::inference::postprocess::PredictionResult;
use crate::inference::registry::{ModelKind, ModelRegistry};
use crate::inference::upload::{UploadSettings, receive_upload};
use crate::inference::{Stage, classify_upload, trace_stage};

pub const ADMIN_PREFIX: &str = "/api/admin/";

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(predict_resource("/predict/", ModelKind::Ecg))
        .service(predict_resource("/predict/ecg", ModelKind::Ecg))
        .service(predict_resource("/predict/mri", ModelKind::Mri))
        .service(predict_resource("/predict/xray", ModelKind::Xray))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(
            web::scope("/api/admin")
                .service(web::resource("/models").route(web::get().to(list_models))),
        );
}

/// POST-only prediction endpoint; any other method is answered with 405
/// before the payload is read.
fn predict_resource(path: &str, kind: ModelKind) -> actix_web::Resource {
    web::resource(path)
        .app_data(web::Data::new(kind))
        .route(web::post().to(predict))
        .default_service(web::to(method_not_allowed))
}

async fn method_not_allowed() -> Result<HttpResponse, ApiError> {
    Err(ApiError::MethodNotAllowed)
}

async fn predict(
    kind: web::Data<ModelKind>,
    registry: web::Data<ModelRegistry>,
    settings: web::Data<UploadSettings>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let kind = *kind.get_ref();
    let request_id = Uuid::new_v4();
    trace_stage(request_id, Stage::AwaitingUpload);

    let model = registry
        .get(kind)
        .ok_or_else(|| ApiError::ModelUnavailable(kind.to_string()))?;

    let upload = receive_upload(payload, &settings.dir, settings.max_bytes).await?;
    trace_stage(request_id, Stage::Validating);
    info!(
        "[{}] {} upload received: {:?}, {} bytes",
        request_id,
        kind,
        upload.filename(),
        upload.size()
    );

    // If the blocking task is dropped unrun, the upload is dropped with it
    // and the temp file still goes away.
    let result = web::block(move || classify_upload(request_id, model, upload))
        .await
        .map_err(|e| ApiError::Blocking(e.to_string()))??;

    Ok(render(kind, &result))
}

fn render(kind: ModelKind, result: &PredictionResult) -> HttpResponse {
    match kind {
        ModelKind::Ecg => HttpResponse::Ok().json(result.to_ecg_response()),
        ModelKind::Mri | ModelKind::Xray => {
            HttpResponse::Ok().json(result.to_classification_response())
        }
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "OK".to_string(),
    })
}

async fn list_models(registry: web::Data<ModelRegistry>) -> HttpResponse {
    HttpResponse::Ok().json(registry.infos())
}
