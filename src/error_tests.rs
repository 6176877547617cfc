use super::*;

#[test]
fn http_status_mapping() {
    assert_eq!(AppError::user("oops").http_status(), 400);
    assert_eq!(AppError::host_auth("denied").http_status(), 401);
    assert_eq!(AppError::csrf("state").http_status(), 403);
    assert_eq!(AppError::AuthTimeout(60).http_status(), 408);
    assert_eq!(AppError::publish("bad csv").http_status(), 422);
    assert_eq!(AppError::connectivity("down").http_status(), 503);
    assert_eq!(AppError::internal("panic").http_status(), 500);
    let api = AppError::Api { status: 404, status_text: "Not Found".into(), body: "{}".into() };
    assert_eq!(api.http_status(), 404);
}

#[test]
fn publish_message_is_displayed_verbatim() {
    let e = AppError::publish("Table déjà publiée");
    assert_eq!(e.to_string(), "Table déjà publiée");
    assert_eq!(e.message(), "Table déjà publiée");
    assert_eq!(e.code_str(), "publish_error");
}

#[test]
fn api_error_carries_status_and_body() {
    let e = AppError::Api { status: 403, status_text: "Forbidden".into(), body: "no access".into() };
    let text = e.to_string();
    assert!(text.contains("403 Forbidden"));
    assert!(text.ends_with("no access"));
}

#[test]
fn login_failures_are_classified() {
    assert!(AppError::csrf("x").is_login_failure());
    assert!(AppError::AuthTimeout(60).is_login_failure());
    assert!(AppError::provider("access_denied").is_login_failure());
    assert!(!AppError::connectivity("x").is_login_failure());
    assert!(!AppError::host_auth("x").is_login_failure());
}
