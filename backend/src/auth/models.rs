use serde::{Deserialize, Deserializer, Serialize};

/// Claims carried by the bearer tokens accepted on admin routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// `None` when the claim is absent or is not a usable id. Such a token
    /// still verifies; it just matches no user.
    #[serde(
        default,
        deserialize_with = "lenient_user_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<i32>,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<usize>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawUserId {
    Number(i64),
    Text(String),
    Other(serde::de::IgnoredAny),
}

// Accepts `5` and `"5"`; anything else becomes `None`.
fn lenient_user_id<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawUserId>::deserialize(deserializer)?;
    Ok(match raw {
        Some(RawUserId::Number(n)) => i32::try_from(n).ok(),
        Some(RawUserId::Text(s)) => s.trim().parse().ok(),
        Some(RawUserId::Other(_)) | None => None,
    })
}

/// Identity placed in request extensions once the admin gate lets a request through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminUser(pub i32);

#[cfg(test)]
mod tests {
    use super::*;

    fn user_id_of(json: &str) -> Option<i32> {
        serde_json::from_str::<Claims>(json).unwrap().user_id
    }

    #[test]
    fn user_id_accepts_number_or_numeric_string() {
        assert_eq!(user_id_of(r#"{"user_id": 5, "exp": 10}"#), Some(5));
        assert_eq!(user_id_of(r#"{"user_id": "5", "exp": 10}"#), Some(5));
    }

    #[test]
    fn unusable_user_id_is_none() {
        assert_eq!(user_id_of(r#"{"exp": 10}"#), None);
        assert_eq!(user_id_of(r#"{"user_id": null, "exp": 10}"#), None);
        assert_eq!(user_id_of(r#"{"user_id": "abc", "exp": 10}"#), None);
        assert_eq!(user_id_of(r#"{"user_id": 99999999999, "exp": 10}"#), None);
        assert_eq!(user_id_of(r#"{"user_id": [1], "exp": 10}"#), None);
    }
}
