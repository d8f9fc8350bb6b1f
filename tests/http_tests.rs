use server_proxy::http::*;

#[test]
fn method_parses_case_insensitively() {
    assert_eq!("get".parse::<Method>().unwrap(), Method::GET);
    assert_eq!("POST".parse::<Method>().unwrap(), Method::POST);
    assert_eq!("Delete".parse::<Method>().unwrap(), Method::DELETE);
    assert_eq!("PATCH".parse::<Method>().unwrap_err(), ParseError::InvalidMethod);
}

#[test]
fn method_is_allowed_checks_the_configured_list() {
    let allowed = vec!["GET".to_string(), "HEAD".to_string()];
    assert!(Method::GET.is_allowed(&allowed));
    assert!(!Method::POST.is_allowed(&allowed));
}

#[test]
fn fresh_request_starts_at_request_line() {
    let req = HttpRequest::new();
    assert_eq!(req.state, ParsingState::RequestLine);
    assert_eq!(req.method, Method::GET);
    assert!(req.url.is_empty());
}

#[test]
fn response_generation_round_trips_headers_and_body() {
    let mut res = HttpResponse::new(200, "OK");
    res.set_header("Content-Type", "text/plain");
    res.set_body(b"Hello Rust".to_vec(), "text/plain");

    let bytes = res.to_bytes();
    let s = String::from_utf8_lossy(&bytes);

    assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(s.contains("Content-Type: text/plain\r\n"));
    assert!(s.contains("Content-Length: 10\r\n"));
    assert!(s.ends_with("\r\n\r\nHello Rust"));
}

#[test]
fn redirect_sets_location_and_status() {
    let res = HttpResponse::redirect(302, "/new-path");
    assert_eq!(res.status_code, 302);
    assert_eq!(res.headers.get("location").unwrap(), "/new-path");
}
