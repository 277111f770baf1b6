use super::jwt::{JwtError, JwtService};
use super::models::AdminUser;
use crate::users::repository::UserRepository;
use actix_web::http::header::Header;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::StatusCode,
};
use actix_web_httpauth::headers::authorization::{Authorization, Bearer};
use futures::future::{Ready, ok};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Guards every route under `prefix`: the caller must present a valid bearer
/// token for a user whose role is the admin sentinel.
#[derive(Clone)]
pub struct AdminGate {
    jwt_service: Arc<JwtService>,
    users: Arc<dyn UserRepository>,
    prefix: Arc<str>,
}

impl AdminGate {
    pub fn new(jwt_service: JwtService, users: Arc<dyn UserRepository>, prefix: &str) -> Self {
        Self {
            jwt_service: Arc::new(jwt_service),
            users,
            prefix: Arc::from(prefix),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AdminGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Transform = AdminGateService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AdminGateService {
            service: Arc::new(service),
            gate: self.clone(),
        })
    }
}

pub struct AdminGateService<S> {
    service: Arc<S>,
    gate: AdminGate,
}

#[derive(Debug, thiserror::Error)]
enum AdminGateError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Forbidden: Admin access required")]
    Forbidden,
    #[error("Internal Server Error")]
    RoleLookup,
}

impl From<JwtError> for AdminGateError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::TokenExpired => AdminGateError::TokenExpired,
            JwtError::InvalidToken | JwtError::Encoding(_) => AdminGateError::InvalidToken,
        }
    }
}

impl AdminGateError {
    fn status(&self) -> StatusCode {
        match self {
            AdminGateError::Unauthorized
            | AdminGateError::TokenExpired
            | AdminGateError::InvalidToken => StatusCode::UNAUTHORIZED,
            AdminGateError::Forbidden => StatusCode::FORBIDDEN,
            AdminGateError::RoleLookup => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn response(&self) -> HttpResponse {
        HttpResponse::build(self.status())
            .content_type("text/plain; charset=utf-8")
            .body(self.to_string())
    }
}

/// Checks the bearer token and the caller's role.
async fn authorize(req: &ServiceRequest, gate: &AdminGate) -> Result<AdminUser, AdminGateError> {
    let bearer = Authorization::<Bearer>::parse(req)
        .map_err(|_| AdminGateError::Unauthorized)?
        .into_scheme();
    let claims = gate.jwt_service.verify_token(bearer.token())?;

    // A verified token without a usable id matches no user.
    let Some(user_id) = claims.user_id else {
        log::debug!("Token carries no usable user_id");
        return Err(AdminGateError::Forbidden);
    };

    let role = gate.users.get_user_role(user_id).await.map_err(|e| {
        log::error!("Role lookup failed for user {}: {}", user_id, e);
        AdminGateError::RoleLookup
    })?;

    match role {
        Some(role) if role.is_admin() => Ok(AdminUser(user_id)),
        _ => Err(AdminGateError::Forbidden),
    }
}

impl<S, B> Service<ServiceRequest> for AdminGateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let gate = self.gate.clone();

        Box::pin(async move {
            if !req.path().starts_with(gate.prefix.as_ref()) {
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            }
            log::debug!("Admin gate processing path: {}", req.path());

            match authorize(&req, &gate).await {
                Ok(admin) => {
                    log::debug!("Admin {} allowed on {}", admin.0, req.path());
                    req.extensions_mut().insert(admin);
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(gate_error) => {
                    log::warn!("Admin gate rejected {}: {}", req.path(), gate_error);
                    let (http_req, _payload) = req.into_parts();
                    let response = gate_error.response().map_into_right_body();
                    Ok(ServiceResponse::new(http_req, response))
                }
            }
        })
    }
}
