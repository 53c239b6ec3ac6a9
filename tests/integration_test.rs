//! Integration tests for the record/replay cycle

use std::io::Write;
use std::sync::Arc;

use tempfile::{NamedTempFile, TempDir};
use tracing_subscriber::EnvFilter;

use cassette_vcr::cassette::EjectOptions;
use cassette_vcr::interaction::Headers;
use cassette_vcr::matchers::RequestMatcherRegistry;
use cassette_vcr::{
    CassetteOptions, Config, HttpInteraction, MatcherRef, RecordMode, Request, Response,
    TemplateVariables, Vcr, VcrError,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn create_vcr(dir: &TempDir) -> Vcr {
    init_tracing();
    Vcr::new(Config::new(dir.path())).unwrap()
}

/// Stand-in for the real HTTP client an adapter would call
fn perform_real_request(request: &Request) -> Response {
    Response::ok(format!("live response for {}", request.uri))
        .with_header("Content-Type", "text/plain")
}

/// What an HTTP adapter does for each outbound request
fn handle(vcr: &Vcr, request: &Request) -> Option<Response> {
    if let Some(response) = vcr.response_for(request) {
        return Some(response);
    }
    if !vcr.real_http_connections_allowed() {
        return None;
    }
    let response = perform_real_request(request);
    vcr.record_http_interaction(HttpInteraction::recorded_now(request.clone(), response.clone()));
    Some(response)
}

#[test]
fn test_record_and_replay_single_request() {
    let dir = TempDir::new().unwrap();
    let request = Request::get("http://example.com/search?q=x");

    // Phase 1: record
    {
        let vcr = create_vcr(&dir);
        vcr.insert_cassette("foo", CassetteOptions::default()).unwrap();
        let response = handle(&vcr, &request).unwrap();
        assert_eq!(response.status.code, 200);
        vcr.eject_cassette(EjectOptions::default()).unwrap();
    }

    let file = dir.path().join("foo.yml");
    assert!(file.exists(), "Cassette file should exist");
    let text = std::fs::read_to_string(&file).unwrap();
    assert!(text.starts_with("http_interactions:"));
    assert!(text.contains("http://example.com:80/search?q=x"));
    assert!(text.contains("recorded_with:"));

    // Phase 2: replay in a fresh engine
    {
        let vcr = create_vcr(&dir);
        let cassette = vcr.insert_cassette("foo", CassetteOptions::default()).unwrap().unwrap();
        assert!(!cassette.recording());
        assert_eq!(vcr.http_interactions_remaining_unused_count(), 1);

        let replayed = vcr.response_for(&request).unwrap();
        assert_eq!(
            replayed.body.as_deref(),
            Some("live response for http://example.com:80/search?q=x")
        );
        assert_eq!(vcr.http_interactions_remaining_unused_count(), 0);

        // Consumed, no repeats, and a `once` cassette with content does not record
        assert_eq!(vcr.response_for(&request), None);
        assert_eq!(handle(&vcr, &request), None);
        vcr.eject_cassette(EjectOptions::default()).unwrap();
    }
}

#[test]
fn test_playback_repeats() {
    let dir = TempDir::new().unwrap();
    let vcr = create_vcr(&dir);
    let request = Request::get("http://example.com/search?q=x");

    vcr.insert_cassette("foo", CassetteOptions::default()).unwrap();
    handle(&vcr, &request);
    vcr.eject_cassette(EjectOptions::default()).unwrap();

    let mut options = CassetteOptions::default();
    options.allow_playback_repeats = true;
    vcr.insert_cassette("foo", options).unwrap();

    let first = vcr.response_for(&request).unwrap();
    let second = vcr.response_for(&request).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        vcr.current_cassette().unwrap().http_interactions().used_interactions().len(),
        1
    );
}

#[test]
fn test_new_episodes_keeps_old_and_adds_new() {
    let dir = TempDir::new().unwrap();
    let vcr = create_vcr(&dir);
    let a = Request::get("http://example.com/a");
    let b = Request::get("http://example.com/b");

    vcr.use_cassette("episodes", CassetteOptions::default(), |_| {
        handle(&vcr, &a);
        Ok::<_, VcrError>(())
    })
    .unwrap();

    let options = CassetteOptions::default().with_record(RecordMode::NewEpisodes);
    vcr.use_cassette("episodes", options, |cassette| {
        assert!(cassette.unwrap().recording());
        handle(&vcr, &a).unwrap();
        handle(&vcr, &b).unwrap();
        assert_eq!(cassette.unwrap().new_recorded_interactions().len(), 1);
        Ok::<_, VcrError>(())
    })
    .unwrap();

    let vcr = create_vcr(&dir);
    let options = CassetteOptions::default().with_record(RecordMode::None);
    vcr.insert_cassette("episodes", options).unwrap();
    assert_eq!(vcr.http_interactions_remaining_unused_count(), 2);
    assert!(!vcr.real_http_connections_allowed());
    assert!(vcr.response_for(&a).is_some());
    assert!(vcr.response_for(&b).is_some());
}

#[test]
fn test_nested_cassettes() {
    let dir = TempDir::new().unwrap();
    let vcr = create_vcr(&dir);
    let outer_request = Request::get("http://outer.example.com/");
    let inner_request = Request::get("http://inner.example.com/");

    vcr.use_cassette("outer", CassetteOptions::default(), |_| {
        handle(&vcr, &outer_request);
        Ok::<_, VcrError>(())
    })
    .unwrap();
    vcr.use_cassette("inner", CassetteOptions::default(), |_| {
        handle(&vcr, &inner_request);
        Ok::<_, VcrError>(())
    })
    .unwrap();

    vcr.insert_cassette("outer", CassetteOptions::default()).unwrap();
    vcr.insert_cassette("inner", CassetteOptions::default()).unwrap();
    assert_eq!(vcr.cassettes().len(), 2);

    assert!(vcr.response_for(&outer_request).is_some());
    assert!(vcr.response_for(&inner_request).is_some());

    let inner = vcr.eject_cassette(EjectOptions::default()).unwrap().unwrap();
    assert_eq!(inner.name(), "inner");
    assert_eq!(vcr.current_cassette().unwrap().name(), "outer");
    assert_eq!(vcr.http_interactions_remaining_unused_count(), 0);
}

#[test]
fn test_templated_cassette() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("templated.yml"),
        r#"http_interactions:
- request:
    method: get
    uri: http://<%= host %>/users/<%= id %>
    body:
      encoding: UTF-8
      string: ''
    headers: {}
  response:
    status:
      code: 200
      message: OK
    headers:
      Content-Length:
      - '2'
    body:
      encoding: UTF-8
      string: '<%= id %>'
    http_version: '1.1'
  recorded_at: Tue, 01 Nov 2011 04:58:44 GMT
recorded_with: cassette-vcr 0.1.0
"#,
    )
    .unwrap();
    let vcr = create_vcr(&dir);

    let options = CassetteOptions::default()
        .with_template_variables(TemplateVariables::values([("host", "api.example.com")]));
    match vcr.insert_cassette("templated", options).err().unwrap() {
        VcrError::MissingTemplateVariable { variable, example, .. } => {
            assert_eq!(variable, "id");
            assert!(example.contains(r#"host = "api.example.com""#));
            assert!(example.contains(r#"id = "some value""#));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(vcr.current_cassette().is_none());

    let options = CassetteOptions::default().with_template_variables(TemplateVariables::values([
        ("host", "api.example.com"),
        ("id", "42"),
    ]));
    vcr.insert_cassette("templated", options).unwrap();
    let response = vcr
        .response_for(&Request::get("http://api.example.com/users/42"))
        .unwrap();
    assert_eq!(response.body.as_deref(), Some("42"));
}

#[test]
fn test_compressed_persister_round_trip() {
    let dir = TempDir::new().unwrap();
    let vcr = create_vcr(&dir);
    let request = Request::get("https://example.com/data");
    let options = || {
        CassetteOptions::default()
            .with_persister("compressed_file_system")
            .with_serializer("json")
    };

    vcr.use_cassette("compressed/data", options(), |cassette| {
        assert_eq!(
            cassette.unwrap().file().unwrap(),
            dir.path().join("compressed/data.json.gz")
        );
        handle(&vcr, &request);
        Ok::<_, VcrError>(())
    })
    .unwrap();

    let bytes = std::fs::read(dir.path().join("compressed/data.json.gz")).unwrap();
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);

    vcr.insert_cassette("compressed/data", options()).unwrap();
    let response = vcr.response_for(&request).unwrap();
    assert_eq!(
        response.body.as_deref(),
        Some("live response for https://example.com:443/data")
    );
}

#[test]
fn test_filter_sensitive_data() {
    let dir = TempDir::new().unwrap();
    let vcr = create_vcr(&dir);
    vcr.filter_sensitive_data("<TOKEN>", None, |_| "s3cr3t-token".to_string());
    let request = Request::get("http://example.com/me").with_header("Authorization", "Bearer s3cr3t-token");

    vcr.use_cassette("secret", CassetteOptions::default(), |_| {
        vcr.record_http_interaction(HttpInteraction::recorded_now(
            request.clone(),
            Response::ok("hello s3cr3t-token"),
        ));
        Ok::<_, VcrError>(())
    })
    .unwrap();

    let text = std::fs::read_to_string(dir.path().join("secret.yml")).unwrap();
    assert!(!text.contains("s3cr3t-token"));
    assert!(text.contains("Bearer <TOKEN>"));

    let options = CassetteOptions::default().with_matchers(["method", "uri", "headers"]);
    vcr.insert_cassette("secret", options).unwrap();
    let response = vcr.response_for(&request).unwrap();
    assert_eq!(response.body.as_deref(), Some("hello s3cr3t-token"));
}

#[test]
fn test_tagged_before_record_hook() {
    let dir = TempDir::new().unwrap();
    let vcr = create_vcr(&dir);
    vcr.before_record(Some("no-health"), |interaction, cassette| {
        assert!(cassette.tags.contains(&"no-health".to_string()));
        if interaction.request.uri.ends_with("/health") {
            interaction.ignore();
        }
    });

    for name in ["tagged", "untagged"] {
        let mut options = CassetteOptions::default();
        if name == "tagged" {
            options = options.with_tag("no-health");
        }
        vcr.use_cassette(name, options, |_| {
            handle(&vcr, &Request::get("http://example.com/health"));
            handle(&vcr, &Request::get("http://example.com/users"));
            Ok::<_, VcrError>(())
        })
        .unwrap();
    }

    let tagged = std::fs::read_to_string(dir.path().join("tagged.yml")).unwrap();
    assert!(!tagged.contains("/health"));
    assert!(tagged.contains("/users"));
    let untagged = std::fs::read_to_string(dir.path().join("untagged.yml")).unwrap();
    assert!(untagged.contains("/health"));
}

#[test]
fn test_custom_and_registered_matchers() {
    let dir = TempDir::new().unwrap();
    let vcr = create_vcr(&dir);
    vcr.request_matchers()
        .register("path_prefix", |a: &Request, b: &Request| {
            a.uri.split('?').next() == b.uri.split('?').next()
        });

    vcr.use_cassette("matchers", CassetteOptions::default(), |_| {
        handle(&vcr, &Request::get("http://example.com/search?q=x&ts=1"));
        Ok::<_, VcrError>(())
    })
    .unwrap();

    let options = CassetteOptions::default().with_matchers(vec![
        MatcherRef::from("method"),
        RequestMatcherRegistry::uri_without_params(&["ts"]),
    ]);
    vcr.insert_cassette("matchers", options).unwrap();
    assert!(vcr.response_for(&Request::get("http://example.com/search?q=x&ts=2")).is_some());
    vcr.eject_cassette(EjectOptions::default()).unwrap();

    let options = CassetteOptions::default().with_matchers(["method", "path_prefix"]);
    vcr.insert_cassette("matchers", options).unwrap();
    assert!(vcr.response_for(&Request::get("http://example.com/search?q=y")).is_some());
}

#[test]
fn test_unused_interactions_fail_eject() {
    let dir = TempDir::new().unwrap();
    let vcr = create_vcr(&dir);
    vcr.use_cassette("unused", CassetteOptions::default(), |_| {
        handle(&vcr, &Request::get("http://example.com/a"));
        handle(&vcr, &Request::get("http://example.com/b"));
        Ok::<_, VcrError>(())
    })
    .unwrap();

    let mut options = CassetteOptions::default();
    options.allow_unused_http_interactions = false;
    let result = vcr.use_cassette("unused", options, |_| {
        vcr.response_for(&Request::get("http://example.com/a"));
        Ok::<_, VcrError>(())
    });

    match result.err().unwrap() {
        VcrError::UnusedInteractions(description) => {
            assert!(description.contains("[get http://example.com:80/b] => [200 OK]"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(vcr.current_cassette().is_none());
}

#[test]
fn test_concurrent_requests_share_one_cassette() {
    let dir = TempDir::new().unwrap();
    let vcr = create_vcr(&dir);
    let request = Request::get("http://example.com/jobs");

    vcr.use_cassette("parallel", CassetteOptions::default(), |_| {
        for _ in 0..8 {
            vcr.record_http_interaction(HttpInteraction::recorded_now(
                request.clone(),
                Response::ok("job"),
            ));
        }
        Ok::<_, VcrError>(())
    })
    .unwrap();

    let vcr = Arc::new(create_vcr(&dir));
    vcr.insert_cassette("parallel", CassetteOptions::default()).unwrap();

    let served: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let vcr = Arc::clone(&vcr);
                let request = request.clone();
                scope.spawn(move || usize::from(vcr.response_for(&request).is_some()))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).sum()
    });

    assert_eq!(served, 8);
    assert_eq!(vcr.http_interactions_remaining_unused_count(), 0);
}

#[test]
fn test_engine_from_config_file() {
    let dir = TempDir::new().unwrap();
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
            cassette_library_dir = "{}"
            ignore_localhost = true

            [default_cassette_options]
            record = "new_episodes"
            serialize_with = "json"
        "#,
        dir.path().display()
    )
    .unwrap();

    let vcr = Vcr::from_config_file(file.path()).unwrap();
    let options = vcr.default_cassette_options();
    assert_eq!(options.record, RecordMode::NewEpisodes);

    vcr.use_cassette("from_config", options, |_| {
        handle(&vcr, &Request::get("http://localhost:8080/"));
        handle(&vcr, &Request::new("POST", "http://example.com/items", Some("{}".into()), Headers::new()));
        Ok::<_, VcrError>(())
    })
    .unwrap();

    let text = std::fs::read_to_string(dir.path().join("from_config.json")).unwrap();
    assert!(text.contains("\"method\": \"post\""));
    assert!(!text.contains("localhost"));
}
