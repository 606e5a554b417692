//! Parameter store calls with the error policy applied.
//!
//! Not-found becomes the caller's default when one is given, permission
//! denials become errors naming the parameter's ARN, and anything else is
//! reported against the region.

use crate::backend::{BackendError, ParameterStore};
use crate::errors::{Result, StagerError};

pub async fn get_parameter(
    store: &dyn ParameterStore,
    name: &str,
    default: Option<&str>,
) -> Result<String> {
    tracing::debug!(region = store.region(), name, "Getting parameter");

    match store.get(name).await {
        Ok(value) => Ok(value),
        Err(BackendError::NotFound) => match default {
            Some(default) => Ok(default.to_string()),
            None => Err(StagerError::ParameterNotFound {
                name: name.to_string(),
            }),
        },
        Err(BackendError::PermissionDenied) => Err(StagerError::NotAllowedToGetParameter {
            arn: store.arn(name),
        }),
        Err(source) => Err(regional(store, source)),
    }
}

pub async fn put_parameter(store: &dyn ParameterStore, name: &str, value: &str) -> Result<()> {
    tracing::debug!(region = store.region(), name, "Putting parameter");

    store.put(name, value).await.map_err(|err| match err {
        BackendError::PermissionDenied => StagerError::NotAllowedToPutParameter {
            arn: store.arn(name),
        },
        source => regional(store, source),
    })
}

/// Deletes a parameter. Deleting one that does not exist succeeds.
pub async fn delete_parameter(store: &dyn ParameterStore, name: &str) -> Result<()> {
    tracing::debug!(region = store.region(), name, "Deleting parameter");

    match store.delete(name).await {
        Ok(()) | Err(BackendError::NotFound) => Ok(()),
        Err(BackendError::PermissionDenied) => Err(StagerError::NotAllowedToPutParameter {
            arn: store.arn(name),
        }),
        Err(source) => Err(regional(store, source)),
    }
}

/// Re-labels parameter permission errors as configuration permission errors,
/// which carry remediation guidance.
pub fn as_config_error(err: StagerError) -> StagerError {
    match err {
        StagerError::NotAllowedToGetParameter { arn } => {
            StagerError::NotAllowedToGetConfigParameter { arn }
        }
        StagerError::NotAllowedToPutParameter { arn } => {
            StagerError::NotAllowedToPutConfigParameter { arn }
        }
        other => other,
    }
}

fn regional(store: &dyn ParameterStore, source: BackendError) -> StagerError {
    StagerError::Backend {
        region: store.region().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, Call, MemoryBackend};

    const REGION: &str = "eu-west-2";

    #[tokio::test]
    async fn test_get() {
        let backend = MemoryBackend::new();
        backend.set_parameter(REGION, "/name", "value");
        let store = backend.parameter_store(REGION);

        assert_eq!(
            get_parameter(store.as_ref(), "/name", None).await.unwrap(),
            "value"
        );
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let backend = MemoryBackend::new();
        let store = backend.parameter_store(REGION);

        assert_eq!(
            get_parameter(store.as_ref(), "/name", Some("{}"))
                .await
                .unwrap(),
            "{}"
        );

        let err = get_parameter(store.as_ref(), "/name", None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "parameter \"/name\" was not found");
    }

    #[tokio::test]
    async fn test_get_permission_denied_is_never_a_default() {
        let backend = MemoryBackend::new();
        backend.fail(REGION, Call::GetParameter, BackendError::PermissionDenied);
        let store = backend.parameter_store(REGION);

        let err = get_parameter(store.as_ref(), "/name", Some("{}"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StagerError::NotAllowedToGetParameter { ref arn }
                if arn == "arn:aws:ssm:eu-west-2:123456789012:parameter/name"
        ));
    }

    #[tokio::test]
    async fn test_get_other_error() {
        let backend = MemoryBackend::new();
        backend.fail(REGION, Call::GetParameter, BackendError::Other("timeout".into()));
        let store = backend.parameter_store(REGION);

        let err = get_parameter(store.as_ref(), "/name", Some("{}"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "eu-west-2: timeout");
    }

    #[tokio::test]
    async fn test_put_permission_denied() {
        let backend = MemoryBackend::new();
        backend.fail(REGION, Call::PutParameter, BackendError::PermissionDenied);
        let store = backend.parameter_store(REGION);

        let err = put_parameter(store.as_ref(), "/startifact", "{}")
            .await
            .unwrap_err();
        let err = as_config_error(err);
        assert!(matches!(err, StagerError::NotAllowedToPutConfigParameter { .. }));
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let backend = MemoryBackend::new();
        let store = backend.parameter_store(REGION);
        delete_parameter(store.as_ref(), "/startifact").await.unwrap();
        assert_eq!(backend.calls(REGION, Call::DeleteParameter), 1);
    }
}
