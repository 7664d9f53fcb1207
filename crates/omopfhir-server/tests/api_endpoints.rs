use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use omopfhir_core::{Concept, Vocabulary};
use omopfhir_mapping::IngestionSettings;
use omopfhir_server::{AppConfig, AppState, build_app};
use serde_json::{Value, json};
use tower::ServiceExt;

async fn seeded_state(ingestion: Option<IngestionSettings>) -> AppState {
    let (_store, services) = omopfhir_db_memory::create_omop_services();
    let stores = omopfhir_db_memory::create_mapping_stores();

    services
        .vocabularies
        .create(&Vocabulary {
            id: "LOINC".into(),
            name: "Logical Observation Identifiers Names and Codes".into(),
            reference: "http://loinc.org".into(),
            version: "2.76".into(),
            vocabulary_concept_id: 44819102,
        })
        .await
        .unwrap();
    let mut glucose = Concept::vocabulary_metadata(3004501, "Glucose [Mass/volume] in Serum or Plasma");
    glucose.domain_id = "Measurement".into();
    glucose.vocabulary_id = "LOINC".into();
    glucose.concept_class_id = "Lab Test".into();
    glucose.concept_code = "2345-7".into();
    services.concepts.create(&glucose).await.unwrap();

    AppState::new(services, stores, ingestion)
}

fn app(state: AppState) -> Router {
    build_app(state, &AppConfig::default())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn healthz_reports_ingestion_state() {
    let app = app(seeded_state(None).await);
    let (status, body) = send(&app, "GET", "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["ingestion"], false);
}

#[tokio::test]
async fn vocabulary_map_crud() {
    let app = app(seeded_state(None).await);

    let entry = json!({"omopVocabularyId": "LOCALLAB", "fhirUrlSystem": "http://example.org/local-lab"});
    let (status, body) = send(&app, "POST", "/admin/vocabulary-map", Some(entry.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["omopVocabularyId"], "LOCALLAB");

    let (status, body) = send(&app, "POST", "/admin/vocabulary-map", Some(entry)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["resourceType"], "OperationOutcome");
    assert_eq!(body["issue"][0]["code"], "conflict");

    let (status, _) = send(
        &app,
        "POST",
        "/admin/vocabulary-map",
        Some(json!({"omopVocabularyId": "EMPTY"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let update = json!({"omopVocabularyId": "LOCALLAB", "otherSystemName": "local-lab"});
    let (status, body) = send(&app, "PUT", "/admin/vocabulary-map/LOCALLAB", Some(update.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["otherSystemName"], "local-lab");

    let (status, _) = send(&app, "PUT", "/admin/vocabulary-map/MISSING", Some(update)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "GET", "/admin/vocabulary-map", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "DELETE", "/admin/vocabulary-map/LOCALLAB", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = send(&app, "GET", "/admin/vocabulary-map", None).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn code_and_state_maps() {
    let app = app(seeded_state(None).await);

    let entry = json!({
        "omopConcept": 3004501,
        "fhirSystem": "urn:oid:2.16.840.1.113883.6.1",
        "fhirCode": "GLU-1",
        "fhirDisplay": "Glucose"
    });
    let (status, _) = send(&app, "POST", "/admin/code-map", Some(entry)).await;
    assert_eq!(status, StatusCode::CREATED);

    // the code map binds a system the registry does not know
    let (status, body) = send(
        &app,
        "GET",
        "/mapping/concept?system=urn:oid:2.16.840.1.113883.6.1&code=GLU-1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 3004501);

    let (status, _) = send(&app, "DELETE", "/admin/code-map/3004501", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let state = json!({"stateName": "Georgia", "twoLetter": "GA"});
    let (status, _) = send(&app, "POST", "/admin/state-map", Some(state)).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = send(
        &app,
        "PUT",
        "/admin/state-map/Georgia",
        Some(json!({"stateName": "Georgia", "twoLetter": "GE"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["twoLetter"], "GE");
    let (status, _) = send(
        &app,
        "POST",
        "/admin/state-map",
        Some(json!({"stateName": " ", "twoLetter": "XX"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn concept_and_coding_lookups() {
    let app = app(seeded_state(None).await);

    let (status, body) = send(&app, "GET", "/mapping/concept?system=http://loinc.org&code=2345-7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 3004501);
    assert_eq!(body["vocabularyId"], "LOINC");

    let (status, _) = send(&app, "GET", "/mapping/concept?system=http://loinc.org&code=0000-0", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "GET", "/mapping/concept?system=urn:unknown&code=1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["issue"][0]["code"], "invalid");

    let (status, _) = send(&app, "GET", "/mapping/concept?system=http://loinc.org", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "GET", "/mapping/coding/3004501", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["system"], "http://loinc.org");
    assert_eq!(body["code"], "2345-7");
    assert_eq!(body["display"], "Glucose [Mass/volume] in Serum or Plasma");

    let (status, _) = send(&app, "GET", "/mapping/coding/42", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ingestion_run_endpoint() {
    let disabled = app(seeded_state(None).await);
    let (status, _) = send(&disabled, "POST", "/admin/ingestion/run", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("local-lab.csv"),
        "LOCALLAB^Local Lab Codes,LOINC\n\
         http://example.org/local-lab,http://loinc.org\n\
         SOURCE_CODESYSTEM,SOURCE_CODE,SOURCE_DESC,TARGET_CODE\n\
         http://example.org/local-lab,GLU,Glucose (local),2345-7\n",
    )
    .unwrap();
    let app = app(seeded_state(Some(IngestionSettings::new(dir.path()))).await);

    let (status, body) = send(&app, "POST", "/admin/ingestion/run", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filesSeen"], 1);
    assert_eq!(body["processed"], 1);
    assert!(dir.path().join("processed").join("local-lab.csv").exists());

    // the new local code now resolves
    let (status, body) = send(
        &app,
        "GET",
        "/mapping/concept?system=http://example.org/local-lab&code=GLU",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["vocabularyId"], "LOCALLAB");
    assert_eq!(body["name"], "Glucose (local)");
}
