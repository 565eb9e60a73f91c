//! The routing layer's output: what the dispatcher needs to know about a
//! deployment.

use std::path::PathBuf;

use cinder_runtime::EngineKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One logical deployment: a stable identity, a route, an artifact on
/// disk, and the engine that interprets the artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Cache key for the compiled module.
    pub id: Uuid,
    /// Route pattern the outer router matched; forwarded to the guest.
    pub route: String,
    /// Path to the deployment artifact; the file's entire contents are
    /// the guest blob.
    pub artifact: PathBuf,
    /// How the blob is interpreted.
    pub engine: EngineKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_shape_parses() {
        let yaml = r#"
id: 7f8ddbb5-3a67-4b5d-9d6a-1f9e37f3c001
route: /echo
artifact: deployments/echo.wasm
engine: native
"#;
        let d: Deployment = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(d.route, "/echo");
        assert_eq!(d.engine, EngineKind::Native);
    }
}
