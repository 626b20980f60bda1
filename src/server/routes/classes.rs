//! Class listing endpoint.

use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::server::state::SharedState;

#[derive(Serialize)]
pub struct ClassesResponse {
    /// Class codes in label order
    pub classes: Vec<String>,
    /// Code to human-readable description
    pub class_descriptions: BTreeMap<String, String>,
}

/// GET /classes - the class taxonomy in index order.
pub async fn list_classes(State(state): State<SharedState>) -> Json<ClassesResponse> {
    let service = state.service();
    let taxonomy = service.taxonomy();

    let class_descriptions = taxonomy
        .iter()
        .map(|class| (class.code.clone(), class.description.clone()))
        .collect();

    Json(ClassesResponse {
        classes: taxonomy.codes(),
        class_descriptions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_uses_contract_field_names() {
        let response = ClassesResponse {
            classes: vec!["mel".to_string()],
            class_descriptions: BTreeMap::from([(
                "mel".to_string(),
                "Melanoma".to_string(),
            )]),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("classes").is_some());
        assert!(json.get("class_descriptions").is_some());
        assert!(json.get("descriptions").is_none());
    }
}
