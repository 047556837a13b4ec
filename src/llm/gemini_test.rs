use super::*;

// =========================================================================
// parse_generate_response
// =========================================================================

#[test]
fn parses_single_text_part() {
    let raw = r#"{
        "candidates": [
            { "content": { "parts": [ { "text": "Three students show a pattern." } ] } }
        ]
    }"#;
    assert_eq!(parse_generate_response(raw).unwrap(), "Three students show a pattern.");
}

#[test]
fn concatenates_multiple_text_parts() {
    let raw = r#"{
        "candidates": [
            { "content": { "parts": [ { "text": "part one " }, { "text": "part two" } ] } }
        ]
    }"#;
    assert_eq!(parse_generate_response(raw).unwrap(), "part one part two");
}

#[test]
fn only_first_candidate_is_read() {
    let raw = r#"{
        "candidates": [
            { "content": { "parts": [ { "text": "first" } ] } },
            { "content": { "parts": [ { "text": "second" } ] } }
        ]
    }"#;
    assert_eq!(parse_generate_response(raw).unwrap(), "first");
}

#[test]
fn missing_candidates_is_a_parse_error() {
    let err = parse_generate_response("{}").unwrap_err();
    assert!(matches!(err, LlmError::ApiParse(_)));
}

#[test]
fn empty_parts_is_a_parse_error() {
    let raw = r#"{ "candidates": [ { "content": { "parts": [] } } ] }"#;
    assert!(matches!(parse_generate_response(raw).unwrap_err(), LlmError::ApiParse(_)));
}

#[test]
fn invalid_json_is_a_parse_error() {
    assert!(matches!(parse_generate_response("not json").unwrap_err(), LlmError::ApiParse(_)));
}

// =========================================================================
// request serialization
// =========================================================================

#[test]
fn free_text_request_omits_generation_config() {
    let body = GenerateContentRequest {
        contents: vec![Content { role: "user", parts: vec![Part { text: "hello" }] }],
        generation_config: None,
    };
    let value = serde_json::to_value(&body).unwrap();
    assert!(value.get("generationConfig").is_none());
    assert_eq!(value["contents"][0]["parts"][0]["text"], "hello");
}

#[test]
fn json_mode_request_declares_mime_type_and_schema() {
    let schema = serde_json::json!({ "type": "object" });
    let body = GenerateContentRequest {
        contents: vec![Content { role: "user", parts: vec![Part { text: "analyze" }] }],
        generation_config: Some(GenerationConfig::json(schema.clone())),
    };
    let value = serde_json::to_value(&body).unwrap();
    assert_eq!(value["generationConfig"]["responseMimeType"], "application/json");
    assert_eq!(value["generationConfig"]["responseSchema"], schema);
}
