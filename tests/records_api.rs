mod common;

use axum::{
    body::Body,
    http::{StatusCode, header},
};
use common::{MultipartBody, TestApp, get, record_fields, request};
use serde_json::{Value, json};

const SF: (&str, &str) = ("37.7749", "-122.4194");
const NY: (&str, &str) = ("40.7128", "-74.0060");

fn ids(page: &Value) -> Vec<String> {
    page["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn list_visibility_depends_on_requester() {
    let app = TestApp::new().await;
    let owner = app.token("owner", false).await;
    let other = app.token("other", false).await;
    let staff = app.token("curator", true).await;

    let public = app
        .create_record(&owner, &record_fields("Accipiter cooperii", SF.0, SF.1, "true"))
        .await;
    let private = app
        .create_record(&owner, &record_fields("Buteo jamaicensis", SF.0, SF.1, "false"))
        .await;
    let public_id = public["id"].as_str().unwrap();
    let private_id = private["id"].as_str().unwrap();

    let (status, anon) = app.get_json("/records", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(anon["count"], 1);
    assert_eq!(ids(&anon), vec![public_id.to_string()]);

    let (_, theirs) = app.get_json("/records", Some(&other)).await;
    assert_eq!(theirs["count"], 1);

    let (_, mine) = app.get_json("/records", Some(&owner)).await;
    assert_eq!(mine["count"], 2);

    let (_, everything) = app.get_json("/records", Some(&staff)).await;
    assert_eq!(everything["count"], 2);

    let (status, _) = app
        .get_json(&format!("/records/{private_id}"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = app
        .get_json(&format!("/records/{private_id}"), Some(&owner))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["contributor_username"], "owner");
    assert_eq!(body["is_verified"], false);
    assert!(body["image"].as_str().unwrap().ends_with("/media/image"));
    assert!(body["audio"].is_null());
    assert_eq!(
        body["location"],
        json!({"type": "Point", "coordinates": [-122.4194, 37.7749]})
    );
}

#[tokio::test]
async fn invalid_token_is_rejected() {
    let app = TestApp::new().await;
    let (status, body) = app.get_json("/records", Some("not-a-real-token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);
}

#[tokio::test]
async fn create_requires_account_and_media() {
    let app = TestApp::new().await;
    let token = app.token("observer", false).await;

    let anonymous = MultipartBody::new()
        .fields(&record_fields("Accipiter cooperii", SF.0, SF.1, "true"))
        .file("image", "hawk.jpg", "image/jpeg", b"jpeg")
        .request("POST", "/records", None);
    let (status, _, _) = app.send(anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let no_media = MultipartBody::new()
        .fields(&record_fields("Accipiter cooperii", SF.0, SF.1, "true"))
        .request("POST", "/records", Some(&token));
    let (status, _, body) = app.send(no_media).await;
    let body = common::parse_json(&body);
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["non_field_errors"].is_array());

    // Media is still reported when other fields are broken too.
    let nothing_valid = MultipartBody::new()
        .text("latitude", "200")
        .request("POST", "/records", Some(&token));
    let (status, _, body) = app.send(nothing_valid).await;
    let body = common::parse_json(&body);
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["non_field_errors"].is_array());
    assert!(body["fields"]["longitude"].is_array());

    let (_, page) = app.get_json("/records", Some(&token)).await;
    assert_eq!(page["count"], 0);
}

#[tokio::test]
async fn radius_filter_keeps_nearby_records_only() {
    let app = TestApp::new().await;
    let token = app.token("observer", false).await;
    app.create_record(&token, &record_fields("Accipiter cooperii", SF.0, SF.1, "true"))
        .await;

    let (_, near) = app
        .get_json("/records?lat=37.7749&lng=-122.4194&radius=10", None)
        .await;
    assert_eq!(near["count"], 1);

    let (_, far) = app
        .get_json("/records?lat=40.7128&lng=-74.0060&radius=10", None)
        .await;
    assert_eq!(far["count"], 0);

    app.create_record(&token, &record_fields("Buteo jamaicensis", NY.0, NY.1, "true"))
        .await;
    let (_, ny) = app
        .get_json("/records?lat=40.7128&lng=-74.0060&radius=10", None)
        .await;
    assert_eq!(ny["count"], 1);
    assert_eq!(ny["results"][0]["species_name"], "Buteo jamaicensis");

    let (status, ignored) = app
        .get_json("/records?lat=40.7128&lng=-74.0060&radius=abc", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ignored["count"], 2);
}

#[tokio::test]
async fn search_filters_and_ordering() {
    let app = TestApp::new().await;
    let token = app.token("observer", false).await;

    let mut hawk = record_fields("Accipiter cooperii", SF.0, SF.1, "true");
    hawk.push(("common_name", "Cooper's Hawk"));
    hawk.push(("ai_confidence", "0.4"));
    app.create_record(&token, &hawk).await;

    let mut falcon = record_fields("Falco peregrinus", NY.0, NY.1, "true");
    falcon.push(("notes", "stooping on pigeons, 100% sure"));
    falcon.push(("ai_confidence", "0.9"));
    app.create_record(&token, &falcon).await;

    let (_, found) = app.get_json("/records?search=HAWK", None).await;
    assert_eq!(found["count"], 1);
    assert_eq!(found["results"][0]["common_name"], "Cooper's Hawk");

    let (_, literal) = app.get_json("/records?search=100%25", None).await;
    assert_eq!(literal["count"], 1);
    let (_, wildcard) = app.get_json("/records?search=%25", None).await;
    assert_eq!(wildcard["count"], 1);

    let (_, by_name) = app.get_json("/records?species_name=falco", None).await;
    assert_eq!(by_name["count"], 1);

    let (_, ascending) = app
        .get_json("/records?ordering=ai_confidence", None)
        .await;
    assert_eq!(ascending["results"][0]["species_name"], "Accipiter cooperii");
    let (_, descending) = app
        .get_json("/records?ordering=-ai_confidence,bogus", None)
        .await;
    assert_eq!(descending["results"][0]["species_name"], "Falco peregrinus");

    let (status, body) = app.get_json("/records?is_verified=maybe", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["is_verified"].is_array());
}

fn species(page: &Value) -> Vec<String> {
    page["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["species_name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn date_contributor_and_location_filters() {
    let app = TestApp::new().await;
    let alice = app.token("alice", false).await;
    let bob = app.token("bob", false).await;

    for (token, name, date, place) in [
        (&alice, "Anas platyrhynchos", "2024-01-01T00:00:00Z", "Lake Merritt"),
        (&alice, "Ardea herodias", "2024-06-15T12:30:00.250Z", "San Francisco Bay"),
        (&bob, "Aythya affinis", "2024-12-31T23:59:59Z", "Crissy Field"),
    ] {
        let mut fields = record_fields(name, SF.0, SF.1, "true");
        fields.retain(|(key, _)| *key != "observation_date");
        fields.push(("observation_date", date));
        fields.push(("location_name", place));
        app.create_record(token, &fields).await;
    }

    let (_, from) = app
        .get_json("/records?observation_date_min=2024-06-15T12:30:00.250Z&ordering=observation_date", None)
        .await;
    assert_eq!(species(&from), ["Ardea herodias", "Aythya affinis"]);

    let (_, just_after) = app
        .get_json("/records?observation_date_min=2024-06-15T12:30:00.251Z", None)
        .await;
    assert_eq!(species(&just_after), ["Aythya affinis"]);

    let (_, until) = app
        .get_json("/records?observation_date_max=2024-06-15T12:30:00.250Z&ordering=observation_date", None)
        .await;
    assert_eq!(species(&until), ["Anas platyrhynchos", "Ardea herodias"]);

    // 14:30:00.250+02:00 is the same instant as the middle record.
    let (_, offset) = app
        .get_json(
            "/records?observation_date_min=2024-06-15T14:30:00.250%2B02:00\
             &observation_date_max=2024-06-15T14:30:00.250%2B02:00",
            None,
        )
        .await;
    assert_eq!(species(&offset), ["Ardea herodias"]);

    let (_, whole_day) = app
        .get_json("/records?observation_date_min=2024-01-01&observation_date_max=2024-01-01", None)
        .await;
    assert_eq!(species(&whole_day), ["Anas platyrhynchos"]);

    let (status, body) = app
        .get_json("/records?observation_date_min=yesterday", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["observation_date_min"].is_array());

    let (_, bobs) = app.get_json("/records?search=crissy", None).await;
    let bob_id = bobs["results"][0]["contributor"].as_str().unwrap().to_string();
    let (_, by_contributor) = app
        .get_json(&format!("/records?contributor_id={bob_id}"), None)
        .await;
    assert_eq!(species(&by_contributor), ["Aythya affinis"]);

    let (_, by_place) = app
        .get_json("/records?location_name=francisco%20BAY", None)
        .await;
    assert_eq!(species(&by_place), ["Ardea herodias"]);
    let (_, nowhere) = app.get_json("/records?location_name=Yosemite", None).await;
    assert_eq!(nowhere["count"], 0);
}

#[tokio::test]
async fn text_matching_and_name_ordering_ignore_case() {
    let app = TestApp::new().await;
    let token = app.token("observer", false).await;

    let mut eagle = record_fields("Aquila chrysaetos", SF.0, SF.1, "true");
    eagle.push(("common_name", "Águila Real"));
    app.create_record(&token, &eagle).await;

    let mut hawk = record_fields("buteo jamaicensis", SF.0, SF.1, "true");
    hawk.push(("ai_confidence", "0.7"));
    app.create_record(&token, &hawk).await;

    let mut gull = record_fields("Larus occidentalis", SF.0, SF.1, "true");
    gull.push(("ai_confidence", "0.2"));
    app.create_record(&token, &gull).await;

    // "águila" and "ÁGUILA", percent-encoded.
    let (_, lower) = app.get_json("/records?search=%C3%A1guila", None).await;
    assert_eq!(species(&lower), ["Aquila chrysaetos"]);
    let (_, upper) = app
        .get_json("/records?common_name=%C3%81GUILA", None)
        .await;
    assert_eq!(species(&upper), ["Aquila chrysaetos"]);

    let (_, by_name) = app.get_json("/records?ordering=species_name", None).await;
    assert_eq!(
        species(&by_name),
        ["Aquila chrysaetos", "buteo jamaicensis", "Larus occidentalis"]
    );
    let (_, by_name_desc) = app.get_json("/records?ordering=-species_name", None).await;
    assert_eq!(
        species(&by_name_desc),
        ["Larus occidentalis", "buteo jamaicensis", "Aquila chrysaetos"]
    );

    let (_, ascending) = app.get_json("/records?ordering=ai_confidence", None).await;
    assert_eq!(
        species(&ascending),
        ["Larus occidentalis", "buteo jamaicensis", "Aquila chrysaetos"]
    );
    let (_, descending) = app.get_json("/records?ordering=-ai_confidence", None).await;
    assert_eq!(
        species(&descending),
        ["buteo jamaicensis", "Larus occidentalis", "Aquila chrysaetos"]
    );
}

#[tokio::test]
async fn undecodable_query_gets_json_error() {
    let app = TestApp::new().await;

    for uri in [
        "/records?species_name=a&species_name=b",
        "/records/export?species_name=a&species_name=b",
    ] {
        let (status, headers, body) = app.send(get(uri, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        let body = common::parse_json(&body);
        assert_eq!(body["status"], 400);
        assert!(body["error"].as_str().unwrap().contains("species_name"), "{body}");
    }
}

#[tokio::test]
async fn pagination_envelope() {
    let app = TestApp::new().await;
    let token = app.token("observer", false).await;
    for species in ["Anas platyrhynchos", "Ardea herodias", "Aythya affinis"] {
        app.create_record(&token, &record_fields(species, SF.0, SF.1, "true"))
            .await;
    }

    let (_, first) = app.get_json("/records?page_size=2", None).await;
    assert_eq!(first["count"], 3);
    assert_eq!(first["results"].as_array().unwrap().len(), 2);
    assert_eq!(first["next"], 2);
    assert!(first["previous"].is_null());

    let (_, second) = app.get_json("/records?page_size=2&page=2", None).await;
    assert_eq!(second["results"].as_array().unwrap().len(), 1);
    assert!(second["next"].is_null());
    assert_eq!(second["previous"], 1);

    let (_, past_end) = app.get_json("/records?page_size=2&page=7", None).await;
    assert_eq!(past_end["count"], 3);
    assert!(past_end["results"].as_array().unwrap().is_empty());

    let (status, _) = app.get_json("/records?page=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn writes_are_limited_to_owner_and_staff() {
    let app = TestApp::new().await;
    let owner = app.token("owner", false).await;
    let other = app.token("other", false).await;
    let staff = app.token("curator", true).await;

    let record = app
        .create_record(&owner, &record_fields("Accipiter cooperii", SF.0, SF.1, "true"))
        .await;
    let uri = format!("/records/{}", record["id"].as_str().unwrap());

    let (status, _, _) = app
        .send(request("DELETE", &uri, Some(&other)).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let patch = MultipartBody::new()
        .text("notes", "perched on a fence")
        .request("PATCH", &uri, Some(&other));
    let (status, _, _) = app.send(patch).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let patch = MultipartBody::new()
        .text("notes", "seen by a curator")
        .request("PATCH", &uri, Some(&staff));
    let (status, _, body) = app.send(patch).await;
    let body = common::parse_json(&body);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notes"], "seen by a curator");
    assert_eq!(body["contributor_username"], "owner");

    let (status, _, _) = app
        .send(request("DELETE", &uri, None).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = app
        .send(request("DELETE", &uri, Some(&owner)).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get_json(&uri, Some(&owner)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.get_json("/records/not-a-uuid", Some(&owner)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn put_and_patch_validation() {
    let app = TestApp::new().await;
    let owner = app.token("owner", false).await;
    let record = app
        .create_record(&owner, &record_fields("Accipiter cooperii", SF.0, SF.1, "true"))
        .await;
    let uri = format!("/records/{}", record["id"].as_str().unwrap());

    let lat_only = MultipartBody::new()
        .text("latitude", "40.0")
        .request("PATCH", &uri, Some(&owner));
    let (status, _, body) = app.send(lat_only).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(common::parse_json(&body)["fields"]["longitude"].is_array());

    let put_missing = MultipartBody::new()
        .text("species_name", "Buteo jamaicensis")
        .request("PUT", &uri, Some(&owner));
    let (status, _, body) = app.send(put_missing).await;
    let body = common::parse_json(&body);
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["observation_date"].is_array());

    let put = MultipartBody::new()
        .fields(&record_fields("Buteo jamaicensis", NY.0, NY.1, "false"))
        .file("audio", "call.mp3", "audio/mpeg", b"ID3 call")
        .request("PUT", &uri, Some(&owner));
    let (status, _, body) = app.send(put).await;
    let body = common::parse_json(&body);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["species_name"], "Buteo jamaicensis");
    assert_eq!(body["latitude"], 40.7128);
    assert_eq!(body["is_public"], false);
    assert!(body["image"].is_string());
    assert!(body["audio"].is_string());
}

#[tokio::test]
async fn media_is_streamed_back() {
    let app = TestApp::new().await;
    let owner = app.token("owner", false).await;
    let record = app
        .create_record(&owner, &record_fields("Accipiter cooperii", SF.0, SF.1, "false"))
        .await;
    let url = record["image"].as_str().unwrap().to_string();

    let (status, headers, body) = app.send(get(&url, Some(&owner))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"\xff\xd8\xff fake jpeg");
    assert_eq!(headers[header::CONTENT_TYPE], "image/jpeg");
    assert!(headers.contains_key(header::ETAG));

    let (status, _, _) = app.send(get(&url, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let video = url.replace("/image", "/video");
    let (status, _, _) = app.send(get(&video, Some(&owner))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn verification_is_one_way() {
    let app = TestApp::new().await;
    let owner = app.token("owner", false).await;
    let other = app.token("other", false).await;
    let record = app
        .create_record(&owner, &record_fields("Accipiter cooperii", SF.0, SF.1, "true"))
        .await;
    let uri = format!("/records/{}/validate", record["id"].as_str().unwrap());
    let post = |token: Option<&str>| request("POST", &uri, token).body(Body::empty()).unwrap();

    let (status, _, _) = app.send(post(None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _, _) = app.send(post(Some(&other))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, first) = app.send(post(Some(&owner))).await;
    let first = common::parse_json(&first);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], true);
    assert_eq!(first["message"], "Record verified on blockchain");
    let hash = first["blockchain_hash"].as_str().unwrap().to_string();
    assert!(hash.starts_with("0x"));

    let (status, _, second) = app.send(post(Some(&owner))).await;
    let second = common::parse_json(&second);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["success"], false);
    assert_eq!(second["message"], "Record already verified");
    assert_eq!(second["blockchain_hash"], hash.as_str());

    // Editing does not reset verification.
    let patch = MultipartBody::new()
        .text("notes", "updated after verification")
        .request("PATCH", &format!("/records/{}", record["id"].as_str().unwrap()), Some(&owner));
    let (_, _, body) = app.send(patch).await;
    let body = common::parse_json(&body);
    assert_eq!(body["is_verified"], true);
    assert_eq!(body["blockchain_hash"], hash.as_str());
    assert!(body.get("verification_hash").is_none());

    let (_, verified) = app.get_json("/records?is_verified=true", None).await;
    assert_eq!(verified["count"], 1);
}

#[tokio::test]
async fn species_are_distinct_and_sorted() {
    let app = TestApp::new().await;
    let owner = app.token("owner", false).await;

    let mut buteo = record_fields("Buteo jamaicensis", SF.0, SF.1, "true");
    buteo.push(("common_name", "Red-tailed Hawk"));
    app.create_record(&owner, &buteo).await;
    app.create_record(&owner, &record_fields("Accipiter cooperii", SF.0, SF.1, "true"))
        .await;

    let (status, body) = app.get_json("/species", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results[0]["scientific_name"], "Accipiter cooperii");
    assert_eq!(results[0]["observation_count"], 1);
    assert_eq!(results[1]["scientific_name"], "Buteo jamaicensis");
    assert_eq!(results[1]["common_name"], "Red-tailed Hawk");
    assert_eq!(results[1]["observation_count"], 1);

    // Private records only count for those who can see them.
    app.create_record(&owner, &record_fields("buteo JAMAICENSIS", SF.0, SF.1, "false"))
        .await;
    let (_, public) = app.get_json("/species", None).await;
    assert_eq!(public["results"][1]["observation_count"], 1);
    let (_, own) = app.get_json("/species", Some(&owner)).await;
    assert_eq!(own["count"], 2);
    assert_eq!(own["results"][1]["observation_count"], 2);
    assert_eq!(own["results"][1]["scientific_name"], "Buteo jamaicensis");
}

#[tokio::test]
async fn export_matches_live_representation() {
    let app = TestApp::new().await;
    let owner = app.token("owner", false).await;

    let (status, headers, body) = app.send(get("/records/export", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/csv");
    assert!(
        headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("biodiversity_export.csv")
    );
    let csv = String::from_utf8(body).unwrap();
    assert_eq!(csv.lines().count(), 1);
    assert!(csv.starts_with("id,contributor,species_name,"));

    let mut fields = record_fields("Accipiter cooperii", SF.0, SF.1, "true");
    fields.push(("location_name", "Golden Gate Park, San Francisco"));
    fields.push(("ai_prediction", r#"{"label": "hawk"}"#));
    let live = app.create_record(&owner, &fields).await;
    app.create_record(&owner, &record_fields("Buteo jamaicensis", SF.0, SF.1, "false"))
        .await;

    let (_, headers, body) = app.send(get("/records/export?format=json", None)).await;
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    let rows: Value = serde_json::from_slice(&body).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row["id"], live["id"]);
    assert_eq!(row["contributor"], "owner");
    assert_eq!(row["species_name"], live["species_name"]);
    assert_eq!(row["latitude"], live["latitude"]);
    assert_eq!(row["location_name"], live["location_name"]);
    assert_eq!(row["is_verified"], false);
    assert!(row.get("ai_prediction").is_none());
    assert!(row.get("image").is_none());

    let (_, _, body) = app.send(get("/records/export?format=csv", Some(&owner))).await;
    let csv = String::from_utf8(body).unwrap();
    assert_eq!(csv.lines().count(), 3);
    assert!(csv.contains("\"Golden Gate Park, San Francisco\""));
}

#[tokio::test]
async fn health_endpoints() {
    let app = TestApp::new().await;
    let (status, body) = app.get_json("/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = app.get_json("/readyz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["sqlite"]["ok"], true);
    assert_eq!(body["checks"]["media"]["ok"], true);
}
