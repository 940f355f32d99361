use std::sync::Arc;

use s3fs_api::consts::AUTO_BUCKET_NAME_PREFIX;
use s3fs_provider::UuidGenerator;

use crate::error::ErrorKind;

#[derive(Clone)]
pub struct BucketNamer {
    uuid: Arc<dyn UuidGenerator>,
}

impl BucketNamer {
    pub fn new(uuid: Arc<dyn UuidGenerator>) -> Self {
        Self { uuid }
    }

    pub fn generate(&self) -> Result<String, ErrorKind> {
        self.uuid
            .generate()
            .map(|uuid| format!("{AUTO_BUCKET_NAME_PREFIX}{uuid}"))
            .map_err(|error| {
                ErrorKind::external("cannot create UUID for bucket name", error)
            })
    }
}
