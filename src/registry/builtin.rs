//! Shipped runtime templates

use super::inference_types::*;
use super::runtimes::*;
use super::{DefaultQuery, Protocol, RequestTemplate, ResponseFieldMap, RuntimeQueryRegistry};
use serde_json::json;

const JSON_HEADER: &str = "Content-Type: application/json";
const CAIKIT_GRPC_SERVICE: &str = "caikit.runtime.Nlp.NlpService";
const WATER_QUERY: &str = "At what temperature does water boil?";

fn template(endpoint: &str, header: &str, body: &str, map: ResponseFieldMap) -> RequestTemplate {
    RequestTemplate {
        endpoint: endpoint.to_string(),
        header: header.to_string(),
        body: body.to_string(),
        response_field_map: map,
    }
}

fn caikit_http(task: &str, inputs: &str, map: ResponseFieldMap) -> RequestTemplate {
    template(
        &format!("api/v1/task/{}", task),
        JSON_HEADER,
        &format!(r#"{{"model_id": "$model_name", "inputs": {}}}"#, inputs),
        map,
    )
}

fn caikit_grpc(method: &str, body: &str, map: ResponseFieldMap) -> RequestTemplate {
    template(
        &format!("{}/{}", CAIKIT_GRPC_SERVICE, method),
        "mm-model-id: $model_name",
        body,
        map,
    )
}

pub(super) fn registry() -> RuntimeQueryRegistry {
    let mut registry = RuntimeQueryRegistry::new();
    caikit_tgis(&mut registry);
    caikit_standalone(&mut registry);
    tgis(&mut registry);
    vllm(&mut registry);
    kserve_v2(&mut registry);
    registry
}

fn caikit_tgis(r: &mut RuntimeQueryRegistry) {
    let generated = ResponseFieldMap::text("generated_text");
    r.insert(
        CAIKIT_TGIS,
        ALL_TOKENS,
        Protocol::Http,
        caikit_http("text-generation", r#""$query_input""#, generated.clone()),
    );
    r.insert(
        CAIKIT_TGIS,
        ALL_TOKENS,
        Protocol::Grpc,
        caikit_grpc(
            "TextGenerationTaskPredict",
            r#"{"text": "$query_input"}"#,
            generated.clone(),
        ),
    );
    r.insert(
        CAIKIT_TGIS,
        STREAMING,
        Protocol::Http,
        caikit_http(
            "server-streaming-text-generation",
            r#""$query_input""#,
            generated.clone(),
        ),
    );
    r.insert(
        CAIKIT_TGIS,
        STREAMING,
        Protocol::Grpc,
        caikit_grpc(
            "ServerStreamingTextGenerationTaskPredict",
            r#"{"text": "$query_input"}"#,
            generated,
        ),
    );
    r.insert(
        CAIKIT_TGIS,
        TOKENIZE,
        Protocol::Http,
        caikit_http("tokenization", r#""$query_input""#, ResponseFieldMap::output("results")),
    );
    r.insert(
        CAIKIT_TGIS,
        TOKENIZE,
        Protocol::Grpc,
        caikit_grpc(
            "TokenizationTaskPredict",
            r#"{"text": "$query_input"}"#,
            ResponseFieldMap::output("results"),
        ),
    );
    r.set_default_query(CAIKIT_TGIS, DefaultQuery::text(WATER_QUERY, "74 degrees F"));
    r.set_type_default_query(
        CAIKIT_TGIS,
        TOKENIZE,
        DefaultQuery {
            query_input: json!(WATER_QUERY),
            query_output: Some(r#""end":\d+,"start":0,"text":"At""#.to_string()),
            use_regex: true,
        },
    );
}

fn caikit_standalone(r: &mut RuntimeQueryRegistry) {
    let result_data = ResponseFieldMap::output("data").within("result");
    r.insert(
        CAIKIT_STANDALONE,
        EMBEDDING,
        Protocol::Http,
        caikit_http("embedding", r#""$query_input""#, result_data.clone()),
    );
    r.insert(
        CAIKIT_STANDALONE,
        EMBEDDING,
        Protocol::Grpc,
        caikit_grpc(
            "EmbeddingTaskPredict",
            r#"{"text": "$query_input"}"#,
            result_data,
        ),
    );
    r.insert(
        CAIKIT_STANDALONE,
        RERANK,
        Protocol::Http,
        caikit_http("rerank", "$query_input", ResponseFieldMap::output("scores").within("result")),
    );
    r.insert(
        CAIKIT_STANDALONE,
        SENTENCE_SIMILARITY,
        Protocol::Http,
        caikit_http(
            "sentence-similarity",
            "$query_input",
            ResponseFieldMap::output("scores").within("result"),
        ),
    );
    r.set_type_default_query(
        CAIKIT_STANDALONE,
        EMBEDDING,
        DefaultQuery {
            query_input: json!("test first sentence"),
            query_output: Some(r#"^\[-?\d"#.to_string()),
            use_regex: true,
        },
    );
    r.set_type_default_query(
        CAIKIT_STANDALONE,
        RERANK,
        DefaultQuery {
            query_input: json!({
                "documents": [{"text": "first sentence"}, {"text": "any other sentence"}],
                "query": "first sentence",
            }),
            query_output: Some(r#""index":0"#.to_string()),
            use_regex: true,
        },
    );
    r.set_type_default_query(
        CAIKIT_STANDALONE,
        SENTENCE_SIMILARITY,
        DefaultQuery {
            query_input: json!({
                "source_sentence": "This is a test sentence",
                "sentences": ["This is a test sentence", "Another sentence"],
            }),
            query_output: Some(r#"^\[1\.0"#.to_string()),
            use_regex: true,
        },
    );
}

fn tgis(r: &mut RuntimeQueryRegistry) {
    const SERVICE: &str = "fmaas.GenerationService";
    let header = "mm-model-id: $model_name";
    r.insert(
        TGIS,
        ALL_TOKENS,
        Protocol::Grpc,
        template(
            &format!("{}/Generate", SERVICE),
            header,
            r#"{"requests": [{"text": "$query_input"}]}"#,
            ResponseFieldMap::text("text").within("responses"),
        ),
    );
    r.insert(
        TGIS,
        STREAMING,
        Protocol::Grpc,
        template(
            &format!("{}/GenerateStream", SERVICE),
            header,
            r#"{"request": {"text": "$query_input"}}"#,
            ResponseFieldMap::text("text"),
        ),
    );
    r.insert(
        TGIS,
        TOKENIZE,
        Protocol::Grpc,
        template(
            &format!("{}/Tokenize", SERVICE),
            header,
            r#"{"return_tokens": true, "requests": [{"text": "$query_input"}]}"#,
            ResponseFieldMap::output("tokens").within("responses"),
        ),
    );
    r.set_default_query(TGIS, DefaultQuery::text(WATER_QUERY, "74 degrees F"));
}

fn vllm(r: &mut RuntimeQueryRegistry) {
    r.insert(
        VLLM,
        COMPLETIONS,
        Protocol::Http,
        template(
            "v1/completions",
            JSON_HEADER,
            r#"{"model": "$model_name", "prompt": "$query_input", "max_tokens": 50, "temperature": 0}"#,
            ResponseFieldMap::text("text").within("choices"),
        ),
    );
    r.insert(
        VLLM,
        CHAT_COMPLETIONS,
        Protocol::Http,
        template(
            "v1/chat/completions",
            JSON_HEADER,
            r#"{"model": "$model_name", "messages": [{"role": "user", "content": "$query_input"}], "max_tokens": 50, "temperature": 0}"#,
            ResponseFieldMap::output("message").within("choices"),
        ),
    );
    r.insert(
        VLLM,
        STREAMING,
        Protocol::Http,
        template(
            "v1/completions",
            JSON_HEADER,
            r#"{"model": "$model_name", "prompt": "$query_input", "max_tokens": 50, "temperature": 0, "stream": true}"#,
            ResponseFieldMap::text("text"),
        ),
    );
    r.set_default_query(
        VLLM,
        DefaultQuery {
            query_input: json!(WATER_QUERY),
            query_output: Some(r"(?i)degrees".to_string()),
            use_regex: true,
        },
    );
}

fn kserve_v2(r: &mut RuntimeQueryRegistry) {
    let outputs = ResponseFieldMap::output("data").within("outputs");
    r.insert(
        KSERVE_V2,
        INFER,
        Protocol::Http,
        template(
            "v2/models/$model_name/infer",
            JSON_HEADER,
            r#"{"inputs": $query_input}"#,
            outputs.clone(),
        ),
    );
    r.insert(
        KSERVE_V2,
        INFER,
        Protocol::Grpc,
        template(
            "inference.GRPCInferenceService/ModelInfer",
            "",
            r#"{"model_name": "$model_name", "inputs": $query_input}"#,
            ResponseFieldMap::output("outputs"),
        ),
    );
    r.set_default_query(
        KSERVE_V2,
        DefaultQuery {
            query_input: json!([{
                "name": "input",
                "shape": [1, 4],
                "datatype": "FP32",
                "data": [6.8, 2.8, 4.8, 1.4],
            }]),
            query_output: None,
            use_regex: false,
        },
    );
}
