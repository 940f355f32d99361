pub mod annotations;
pub mod cluster;
pub mod credentials;
pub mod map;
pub mod options;
pub mod request;
pub mod volume;

pub mod consts {
    /// Name of the FlexVolume driver, the provisioner and the expected secret type.
    pub const DRIVER_NAME: &str = "ulagbulag.io/s3fs";

    /// Prefix of every generated bucket name.
    pub const AUTO_BUCKET_NAME_PREFIX: &str = "tmp-s3fs-";
}
