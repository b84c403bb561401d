use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::shared::error::ApiError;

/// Identity supplied by the auth middleware sitting in front of this service.
/// The hierarchy core trusts it unconditionally for audit stamping and
/// institution scoping; session issuance lives elsewhere.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub institution_id: Option<Uuid>,
}

impl CurrentUser {
    fn from_parts_inner(parts: &Parts) -> Result<Self, ApiError> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let id = header("x-user-id")
            .ok_or_else(|| ApiError::Validation("missing x-user-id header".to_string()))?;
        let id = Uuid::parse_str(&id)
            .map_err(|_| ApiError::Validation("malformed x-user-id header".to_string()))?;
        let institution_id = header("x-institution-id")
            .and_then(|v| Uuid::parse_str(&v).ok());
        Ok(Self {
            id,
            email: header("x-user-email").unwrap_or_default(),
            institution_id,
        })
    }
}

#[async_trait::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_parts_inner(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn test_current_user_from_headers() {
        let id = Uuid::new_v4();
        let req = Request::builder()
            .header("x-user-id", id.to_string())
            .header("x-user-email", "teach@example.edu")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        let user = CurrentUser::from_parts_inner(&parts).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.email, "teach@example.edu");
        assert!(user.institution_id.is_none());
    }

    #[test]
    fn test_missing_user_id_rejected() {
        let req = Request::builder().body(()).unwrap();
        let (parts, _) = req.into_parts();
        assert!(CurrentUser::from_parts_inner(&parts).is_err());
    }
}
