use rocket::http::{Header, Status};

use crate::common::*;

#[test]
fn open_api_when_bearer_unset() {
    let h = harness();
    let res = h.get("/status").dispatch();
    assert_eq!(res.status(), Status::Ok);
}

#[test]
fn bearer_enforced_when_configured() {
    let h = harness_with(|c| c.api_bearer = Some("sekret".to_string()));

    let res = h.get("/status").dispatch();
    assert_eq!(res.status(), Status::Unauthorized);

    let res = h
        .get("/status")
        .header(Header::new("Authorization", "Bearer wrong"))
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);

    let res = h
        .get("/status")
        .header(Header::new("Authorization", "Bearer sekret"))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    // Mutating routes are guarded too.
    let res = h.post("/poll/run").dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}
