//! Shared helpers with nowhere more specific to live.

use kube::api::Api;
use kube::Resource;
use serde::de::DeserializeOwned;

use crate::error::ControllerError;

/// Fetches `name`, treating `NotFound` as "tolerated absence" rather than
/// an error: a missing object is not a failure, it's the normal state
/// before creation or after deletion.
pub async fn get_opt<K>(api: &Api<K>, name: &str) -> Result<Option<K>, ControllerError>
where
    K: Clone + std::fmt::Debug + DeserializeOwned + Resource,
{
    match api.get(name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
        Err(e) => Err(ControllerError::Get(e)),
    }
}
