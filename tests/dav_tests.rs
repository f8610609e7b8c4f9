use davkit::{Body, DavHandler, LockManager, MemStore};
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;

fn setup() -> DavHandler {
    let _ = env_logger::builder().is_test(true).try_init();
    DavHandler::builder()
        .store(MemStore::new())
        .lock_manager(LockManager::new())
        .build_handler()
}

async fn request(
    dav: &DavHandler,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let req = builder.body(Body::from(body.to_string())).unwrap();
    dav.handle(req).await
}

async fn body_string(resp: Response<Body>) -> String {
    let data = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(data.to_vec()).unwrap()
}

// Lock-Token response header, angle brackets stripped.
fn lock_token(resp: &Response<Body>) -> String {
    resp.headers()
        .get("lock-token")
        .expect("Lock-Token header")
        .to_str()
        .unwrap()
        .trim_matches(|c| c == '<' || c == '>')
        .to_string()
}

const LOCKINFO_EXCLUSIVE: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:exclusive/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
  <D:owner><D:href>test-suite</D:href></D:owner>
</D:lockinfo>"#;

const LOCKINFO_SHARED: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:shared/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
</D:lockinfo>"#;

#[tokio::test]
async fn lock_put_unlock_flow() {
    let dav = setup();

    let resp = request(&dav, "PUT", "/file.txt", &[], "version one").await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // exclusive LOCK on an existing file: 200, Lock-Token header,
    // lockdiscovery body naming the token.
    let resp = request(&dav, "LOCK", "/file.txt", &[], LOCKINFO_EXCLUSIVE).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let token = lock_token(&resp);
    assert!(token.starts_with("opaquelocktoken:"));
    let text = body_string(resp).await;
    assert!(text.contains("lockdiscovery"));
    assert!(text.contains(&token));

    // PUT without the token is refused.
    let resp = request(&dav, "PUT", "/file.txt", &[], "version two").await;
    assert_eq!(resp.status(), StatusCode::LOCKED);

    // PUT presenting the token succeeds and releases nothing.
    let cond = format!("(<{}>)", token);
    let resp = request(&dav, "PUT", "/file.txt", &[("If", &cond)], "version two").await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = request(&dav, "PUT", "/file.txt", &[], "version three").await;
    assert_eq!(resp.status(), StatusCode::LOCKED);

    // UNLOCK with a wrong token: locks exist, none match.
    let resp = request(
        &dav,
        "UNLOCK",
        "/file.txt",
        &[("Lock-Token", "<opaquelocktoken:bogus>")],
        "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // UNLOCK with the real token, then PUT flows freely again.
    let held = format!("<{}>", token);
    let resp = request(&dav, "UNLOCK", "/file.txt", &[("Lock-Token", &held)], "").await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = request(&dav, "PUT", "/file.txt", &[], "version three").await;
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn lock_deep_covers_subtree() {
    let dav = setup();
    let resp = request(&dav, "MKCOL", "/col/", &[], "").await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // default depth is infinity.
    let resp = request(&dav, "LOCK", "/col/", &[], LOCKINFO_EXCLUSIVE).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let token = lock_token(&resp);

    let resp = request(&dav, "PUT", "/col/child.txt", &[], "data").await;
    assert_eq!(resp.status(), StatusCode::LOCKED);

    // the ancestor's token authorizes mutations below it.
    let cond = format!("(<{}>)", token);
    let resp = request(&dav, "PUT", "/col/child.txt", &[("If", &cond)], "data").await;
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn lock_statuses() {
    let dav = setup();

    // locking an unmapped resource grants the lock with 201, but does
    // not create the resource.
    let resp = request(&dav, "LOCK", "/ghost.txt", &[], LOCKINFO_EXCLUSIVE).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = request(&dav, "GET", "/ghost.txt", &[], "").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // a second exclusive lock on the same resource conflicts.
    let resp = request(&dav, "LOCK", "/ghost.txt", &[], LOCKINFO_EXCLUSIVE).await;
    assert_eq!(resp.status(), StatusCode::LOCKED);

    // two shared locks coexist.
    let resp = request(&dav, "LOCK", "/shared.txt", &[], LOCKINFO_SHARED).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let first = lock_token(&resp);
    let resp = request(&dav, "LOCK", "/shared.txt", &[], LOCKINFO_SHARED).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_ne!(lock_token(&resp), first);

    // Depth: 1 is not a valid locking depth.
    let resp = request(
        &dav,
        "LOCK",
        "/other.txt",
        &[("Depth", "1")],
        LOCKINFO_EXCLUSIVE,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // garbage lockinfo.
    let resp = request(&dav, "LOCK", "/other.txt", &[], "<D:nonsense/>").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // UNLOCK without a Lock-Token header.
    let resp = request(&dav, "UNLOCK", "/ghost.txt", &[], "").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn lock_refresh() {
    let dav = setup();
    let resp = request(&dav, "PUT", "/file.txt", &[], "data").await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = request(
        &dav,
        "LOCK",
        "/file.txt",
        &[("Timeout", "Second-60")],
        LOCKINFO_EXCLUSIVE,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let token = lock_token(&resp);

    // a LOCK without a body but with the held token refreshes the lock.
    let cond = format!("(<{}>)", token);
    let resp = request(
        &dav,
        "LOCK",
        "/file.txt",
        &[("If", &cond), ("Timeout", "Second-3600")],
        "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(lock_token(&resp), token);
    let text = body_string(resp).await;
    assert!(text.contains("Second-3600"));
}

#[tokio::test]
async fn mkcol_statuses() {
    let dav = setup();

    let resp = request(&dav, "MKCOL", "/col/", &[], "").await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // already exists.
    let resp = request(&dav, "MKCOL", "/col/", &[], "").await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

    // parent missing.
    let resp = request(&dav, "MKCOL", "/no/sub/", &[], "").await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // a request body is not understood.
    let resp = request(&dav, "MKCOL", "/col2/", &[], "<x/>").await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn copy_collection_depth_one() {
    let dav = setup();
    request(&dav, "MKCOL", "/src/", &[], "").await;
    request(&dav, "PUT", "/src/a.txt", &[], "aaa").await;
    request(&dav, "PUT", "/src/b.txt", &[], "bbb").await;
    request(&dav, "MKCOL", "/src/sub/", &[], "").await;
    request(&dav, "PUT", "/src/sub/deep.txt", &[], "deep").await;

    let resp = request(
        &dav,
        "COPY",
        "/src/",
        &[("Destination", "http://localhost/dst"), ("Depth", "1")],
        "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // the three direct children arrived under their own names.
    let resp = request(&dav, "PROPFIND", "/dst/", &[("Depth", "1")], "").await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let text = body_string(resp).await;
    assert_eq!(text.matches("<D:response>").count(), 4);
    assert!(text.contains("/dst/a.txt"));
    assert!(text.contains("/dst/b.txt"));
    assert!(text.contains("/dst/sub"));

    // depth 1 stops above the grandchild.
    let resp = request(&dav, "PROPFIND", "/dst/sub/deep.txt", &[], "").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let resp = request(&dav, "GET", "/dst/a.txt", &[], "").await;
    assert_eq!(body_string(resp).await, "aaa");
}

#[tokio::test]
async fn copy_statuses() {
    let dav = setup();
    request(&dav, "PUT", "/one.txt", &[], "one").await;
    request(&dav, "PUT", "/two.txt", &[], "two").await;

    // source and destination are the same resource.
    let resp = request(
        &dav,
        "COPY",
        "/one.txt",
        &[("Destination", "/one.txt")],
        "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // destination exists and overwrite is off.
    let resp = request(
        &dav,
        "COPY",
        "/one.txt",
        &[("Destination", "/two.txt"), ("Overwrite", "F")],
        "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);

    // overwrite defaults to on and replaces.
    let resp = request(&dav, "COPY", "/one.txt", &[("Destination", "/two.txt")], "").await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = request(&dav, "GET", "/two.txt", &[], "").await;
    assert_eq!(body_string(resp).await, "one");

    // destination parent does not exist.
    let resp = request(
        &dav,
        "COPY",
        "/one.txt",
        &[("Destination", "/no/two.txt")],
        "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // missing Destination header.
    let resp = request(&dav, "COPY", "/one.txt", &[], "").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn move_file() {
    let dav = setup();
    request(&dav, "PUT", "/m.txt", &[], "contents").await;

    let resp = request(&dav, "MOVE", "/m.txt", &[("Destination", "/moved.txt")], "").await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = request(&dav, "GET", "/m.txt", &[], "").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let resp = request(&dav, "GET", "/moved.txt", &[], "").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "contents");
}

#[tokio::test]
async fn move_respects_source_lock() {
    let dav = setup();
    request(&dav, "PUT", "/locked.txt", &[], "data").await;
    let resp = request(&dav, "LOCK", "/locked.txt", &[], LOCKINFO_EXCLUSIVE).await;
    let token = lock_token(&resp);

    let resp = request(
        &dav,
        "MOVE",
        "/locked.txt",
        &[("Destination", "/away.txt")],
        "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::LOCKED);

    // the precondition runs against destination and source, so the
    // token is presented in a list tagged with the locked source.
    let cond = format!("<http://localhost/locked.txt> (<{}>)", token);
    let resp = request(
        &dav,
        "MOVE",
        "/locked.txt",
        &[("Destination", "/away.txt"), ("If", &cond)],
        "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn delete_statuses() {
    let dav = setup();
    let resp = request(&dav, "DELETE", "/gone", &[], "").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    request(&dav, "MKCOL", "/col/", &[], "").await;
    request(&dav, "PUT", "/col/f.txt", &[], "x").await;
    let resp = request(&dav, "DELETE", "/col/", &[], "").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = request(&dav, "PROPFIND", "/col/", &[], "").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn put_statuses() {
    let dav = setup();
    request(&dav, "MKCOL", "/col/", &[], "").await;

    // a collection cannot be overwritten with a file body.
    let resp = request(&dav, "PUT", "/col/", &[], "data").await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // missing parent.
    let resp = request(&dav, "PUT", "/no/f.txt", &[], "data").await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // parent is a file.
    request(&dav, "PUT", "/plain.txt", &[], "data").await;
    let resp = request(&dav, "PUT", "/plain.txt/under", &[], "data").await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn proppatch_propfind_roundtrip() {
    let dav = setup();
    request(&dav, "PUT", "/f.txt", &[], "data").await;

    let update = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propertyupdate xmlns:D="DAV:" xmlns:Z="urn:example:props">
  <D:set><D:prop><Z:color>blue</Z:color></D:prop></D:set>
</D:propertyupdate>"#;
    let resp = request(&dav, "PROPPATCH", "/f.txt", &[], update).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let text = body_string(resp).await;
    assert!(text.contains("HTTP/1.1 200 OK"));

    // the literal value comes back.
    let query = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propfind xmlns:D="DAV:" xmlns:Z="urn:example:props">
  <D:prop><Z:color/></D:prop>
</D:propfind>"#;
    let resp = request(&dav, "PROPFIND", "/f.txt", &[("Depth", "0")], query).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let text = body_string(resp).await;
    assert!(text.contains("HTTP/1.1 200 OK"));
    assert!(text.contains(">blue<"));

    // removing it moves the name to the 404 partition on the next read.
    let remove = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propertyupdate xmlns:D="DAV:" xmlns:Z="urn:example:props">
  <D:remove><D:prop><Z:color/></D:prop></D:remove>
</D:propertyupdate>"#;
    let resp = request(&dav, "PROPPATCH", "/f.txt", &[], remove).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let resp = request(&dav, "PROPFIND", "/f.txt", &[("Depth", "0")], query).await;
    let text = body_string(resp).await;
    assert!(text.contains("HTTP/1.1 404 Not Found"));
}

#[tokio::test]
async fn proppatch_rejects_live_properties() {
    let dav = setup();
    request(&dav, "PUT", "/f.txt", &[], "data").await;

    let update = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propertyupdate xmlns:D="DAV:">
  <D:set><D:prop><D:getetag>fake</D:getetag></D:prop></D:set>
</D:propertyupdate>"#;
    let resp = request(&dav, "PROPPATCH", "/f.txt", &[], update).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let text = body_string(resp).await;
    assert!(text.contains("HTTP/1.1 422 Unprocessable Entity"));

    let resp = request(&dav, "PROPPATCH", "/missing.txt", &[], update).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn propfind_depths() {
    let dav = setup();
    request(&dav, "MKCOL", "/col/", &[], "").await;
    request(&dav, "PUT", "/col/f.txt", &[], "hello").await;

    let resp = request(&dav, "PROPFIND", "/col/", &[("Depth", "0")], "").await;
    let text = body_string(resp).await;
    assert_eq!(text.matches("<D:response>").count(), 1);
    assert!(text.contains("<D:collection"));

    let resp = request(&dav, "PROPFIND", "/col/", &[("Depth", "1")], "").await;
    let text = body_string(resp).await;
    assert_eq!(text.matches("<D:response>").count(), 2);
    assert!(text.contains("/col/f.txt"));

    let resp = request(&dav, "PROPFIND", "/", &[], "").await;
    let text = body_string(resp).await;
    assert_eq!(text.matches("<D:response>").count(), 3);

    let resp = request(&dav, "PROPFIND", "/absent", &[], "").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn propfind_propname_suppresses_values() {
    let dav = setup();
    request(&dav, "PUT", "/f.txt", &[], "hello").await;

    let query = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propfind xmlns:D="DAV:"><D:propname/></D:propfind>"#;
    let resp = request(&dav, "PROPFIND", "/f.txt", &[("Depth", "0")], query).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let text = body_string(resp).await;
    assert!(text.contains("D:displayname"));
    assert!(text.contains("D:getcontentlength"));
    assert!(!text.contains(">f.txt<"));
    assert!(!text.contains(">5<"));
}

#[tokio::test]
async fn propfind_reports_lockdiscovery() {
    let dav = setup();
    request(&dav, "PUT", "/f.txt", &[], "data").await;
    let resp = request(&dav, "LOCK", "/f.txt", &[], LOCKINFO_EXCLUSIVE).await;
    let token = lock_token(&resp);

    let query = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propfind xmlns:D="DAV:"><D:prop><D:lockdiscovery/></D:prop></D:propfind>"#;
    let resp = request(&dav, "PROPFIND", "/f.txt", &[("Depth", "0")], query).await;
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let text = body_string(resp).await;
    assert!(text.contains("D:activelock"));
    assert!(text.contains(&token));
    assert!(text.contains("D:exclusive"));
}

#[tokio::test]
async fn options_advertises_locking() {
    let dav = setup();
    let resp = request(&dav, "OPTIONS", "/", &[], "").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("dav").unwrap(), "1,2");
    let allow = resp.headers().get("allow").unwrap().to_str().unwrap();
    assert!(allow.contains("LOCK"));
    assert!(allow.contains("PROPFIND"));
}

#[tokio::test]
async fn get_and_head() {
    let dav = setup();
    request(&dav, "PUT", "/f.txt", &[], "hello world").await;

    let resp = request(&dav, "GET", "/f.txt", &[], "").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("content-length").unwrap(), "11");
    assert!(resp.headers().contains_key("etag"));
    assert_eq!(body_string(resp).await, "hello world");

    let resp = request(&dav, "HEAD", "/f.txt", &[], "").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "");

    let resp = request(&dav, "GET", "/absent", &[], "").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn copy_carries_dead_properties() {
    let dav = setup();
    request(&dav, "PUT", "/f.txt", &[], "data").await;
    let update = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propertyupdate xmlns:D="DAV:" xmlns:Z="urn:example:props">
  <D:set><D:prop><Z:tag>keep</Z:tag></D:prop></D:set>
</D:propertyupdate>"#;
    request(&dav, "PROPPATCH", "/f.txt", &[], update).await;
    request(&dav, "COPY", "/f.txt", &[("Destination", "/copy.txt")], "").await;

    let query = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propfind xmlns:D="DAV:" xmlns:Z="urn:example:props">
  <D:prop><Z:tag/></D:prop>
</D:propfind>"#;
    let resp = request(&dav, "PROPFIND", "/copy.txt", &[("Depth", "0")], query).await;
    let text = body_string(resp).await;
    assert!(text.contains(">keep<"));
}

#[tokio::test]
async fn condition_etag_gates_put() {
    let dav = setup();
    request(&dav, "PUT", "/f.txt", &[], "data").await;
    let resp = request(&dav, "GET", "/f.txt", &[], "").await;
    let etag = resp
        .headers()
        .get("etag")
        .unwrap()
        .to_str()
        .unwrap()
        .trim_matches('"')
        .to_string();

    // matching etag on an unlocked resource passes.
    let cond = format!("([{}])", etag);
    let resp = request(&dav, "PUT", "/f.txt", &[("If", &cond)], "update").await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // the old etag no longer matches.
    let resp = request(&dav, "PUT", "/f.txt", &[("If", &cond)], "update").await;
    assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);

    // malformed condition grammar.
    let resp = request(&dav, "PUT", "/f.txt", &[("If", "(nonsense")], "x").await;
    assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);
}
