#![allow(dead_code)]

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use maplit::btreemap;
use s3fs_api::{
    consts::DRIVER_NAME,
    credentials::{CaBundle, Credentials},
    map::StringMap,
    request::ProvisionRequest,
};
use s3fs_provider::{
    error::codes, BucketConfigPatch, CreateBucketOptions, ObjectStorageSession,
    ObjectStorageSessionFactory, PolicyService, ProviderError, ResolvedService, Result,
    SecretData, SecretStore, ServiceResolver, TopologyService, UuidGenerator,
};
use s3fs_provisioner::{Provisioner, ProvisionerArgs, ProvisionerPorts};

pub const CLUSTER_ID: &str = "cluster-1";
pub const NAMESPACE: &str = "team-a";
pub const SECRET_NAME: &str = "creds";

#[derive(Default)]
pub struct FakeSecretStore {
    secrets: Mutex<BTreeMap<(String, String), SecretData>>,
}

impl FakeSecretStore {
    pub fn insert(&self, namespace: &str, name: &str, data: StringMap) {
        let secret = SecretData {
            type_: Some(DRIVER_NAME.into()),
            data,
        };
        self.secrets
            .lock()
            .unwrap()
            .insert((namespace.into(), name.into()), secret);
    }
}

#[async_trait]
impl SecretStore for FakeSecretStore {
    async fn get(&self, name: &str, namespace: &str) -> Result<SecretData> {
        self.secrets
            .lock()
            .unwrap()
            .get(&(namespace.into(), name.into()))
            .cloned()
            .ok_or_else(|| {
                ProviderError::new(format!("secrets \"{name}\" not found"))
                    .with_code(codes::NOT_FOUND)
            })
    }
}

pub struct FakeServices;

#[async_trait]
impl ServiceResolver for FakeServices {
    async fn resolve(&self, name: &str, namespace: &str) -> Result<ResolvedService> {
        Ok(ResolvedService {
            host: format!("{name}.{namespace}.svc.cluster.local"),
            cluster_ip: "10.96.0.10".into(),
            port: 443,
        })
    }
}

#[derive(Debug, Default)]
pub struct ObjectState {
    pub buckets: BTreeMap<String, BTreeSet<String>>,
    pub created: Vec<String>,
    pub deleted: Vec<String>,
    pub versioned: BTreeSet<String>,
    pub sessions: usize,
    pub create_error: Option<ProviderError>,
    pub delete_error: Option<ProviderError>,
    pub versioning_error: Option<ProviderError>,
    pub access_error: Option<ProviderError>,
    pub last_kp_root_key_crn: Option<String>,
    pub last_ca_bundle: Option<CaBundle>,
}

#[derive(Clone, Default)]
pub struct FakeObjectStore {
    pub state: Arc<Mutex<ObjectState>>,
}

impl FakeObjectStore {
    pub fn with_state<R>(&self, f: impl FnOnce(&mut ObjectState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn add_bucket(&self, bucket: &str, objects: &[&str]) {
        self.with_state(|state| {
            state.buckets.insert(
                bucket.into(),
                objects.iter().map(|object| object.to_string()).collect(),
            )
        });
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.with_state(|state| state.buckets.contains_key(bucket))
    }
}

#[async_trait]
impl ObjectStorageSessionFactory for FakeObjectStore {
    async fn new_session(
        &self,
        endpoint: &str,
        _region: Option<&str>,
        _credentials: &Credentials,
        ca_bundle: Option<&CaBundle>,
    ) -> Result<Box<dyn ObjectStorageSession>> {
        assert!(endpoint.starts_with("http"), "endpoint: {endpoint}");
        self.with_state(|state| {
            state.sessions += 1;
            state.last_ca_bundle = ca_bundle.cloned();
        });
        Ok(Box::new(self.clone()))
    }
}

fn no_such_bucket(bucket: &str) -> ProviderError {
    ProviderError::new(format!("bucket not found: {bucket}")).with_code(codes::NO_SUCH_BUCKET)
}

#[async_trait]
impl ObjectStorageSession for FakeObjectStore {
    async fn check_bucket_access(&self, bucket: &str) -> Result<()> {
        self.with_state(|state| {
            if let Some(error) = state.access_error.clone() {
                return Err(error);
            }
            if state.buckets.contains_key(bucket) {
                Ok(())
            } else {
                Err(no_such_bucket(bucket))
            }
        })
    }

    async fn check_object_path_existence(&self, bucket: &str, object_path: &str) -> Result<bool> {
        let object_path = object_path.trim_start_matches('/');
        self.with_state(|state| {
            let objects = state.buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
            Ok(objects
                .iter()
                .any(|name| name == object_path || name.trim_end_matches('/') == object_path))
        })
    }

    async fn create_bucket(&self, bucket: &str, options: &CreateBucketOptions) -> Result<()> {
        self.with_state(|state| {
            if let Some(error) = state.create_error.clone() {
                return Err(error);
            }
            if state.buckets.contains_key(bucket) {
                return Err(ProviderError::new("bucket already owned by you")
                    .with_code(codes::BUCKET_ALREADY_OWNED_BY_YOU));
            }
            state.buckets.insert(bucket.into(), BTreeSet::default());
            state.created.push(bucket.into());
            state.last_kp_root_key_crn = options.kp_root_key_crn.clone();
            Ok(())
        })
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.with_state(|state| {
            if let Some(error) = state.delete_error.clone() {
                return Err(error);
            }
            state
                .buckets
                .remove(bucket)
                .ok_or_else(|| no_such_bucket(bucket))?;
            state.deleted.push(bucket.into());
            Ok(())
        })
    }

    async fn set_bucket_versioning(&self, bucket: &str, enabled: bool) -> Result<()> {
        self.with_state(|state| {
            if let Some(error) = state.versioning_error.clone() {
                return Err(error);
            }
            if enabled {
                state.versioned.insert(bucket.into());
            }
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct FakePolicy {
    pub patches: Mutex<Vec<(String, BucketConfigPatch, String)>>,
    pub firewall_error: Mutex<Option<ProviderError>>,
    pub quota_error: Mutex<Option<ProviderError>>,
    pub delay: Mutex<Option<Duration>>,
}

impl FakePolicy {
    pub fn patches(&self) -> Vec<(String, BucketConfigPatch, String)> {
        self.patches.lock().unwrap().clone()
    }
}

#[async_trait]
impl PolicyService for FakePolicy {
    async fn update_bucket_config(
        &self,
        bucket: &str,
        patch: &BucketConfigPatch,
        api_key: &str,
    ) -> Result<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            ::tokio::time::sleep(delay).await;
        }

        self.patches
            .lock()
            .unwrap()
            .push((bucket.into(), patch.clone(), api_key.into()));

        let error = if patch.firewall.is_some() {
            self.firewall_error.lock().unwrap().clone()
        } else {
            self.quota_error.lock().unwrap().clone()
        };
        error.map_or(Ok(()), Err)
    }
}

pub struct FakeTopology {
    pub cluster_type: Mutex<String>,
    pub endpoints: Mutex<String>,
    pub delay: Mutex<Option<Duration>>,
}

impl Default for FakeTopology {
    fn default() -> Self {
        Self {
            cluster_type: Mutex::new("vpc-gen2".into()),
            endpoints: Mutex::new("166.9.0.0/16,161.26.0.0/16".into()),
            delay: Mutex::default(),
        }
    }
}

#[async_trait]
impl TopologyService for FakeTopology {
    async fn get_cluster_type(&self, _id: &str) -> Result<String> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            ::tokio::time::sleep(delay).await;
        }
        Ok(self.cluster_type.lock().unwrap().clone())
    }

    async fn get_service_endpoints(&self, _id: &str) -> Result<String> {
        Ok(self.endpoints.lock().unwrap().clone())
    }
}

/// Hands out predictable v4 UUIDs.
#[derive(Default)]
pub struct SequentialUuid {
    next: AtomicUsize,
}

impl UuidGenerator for SequentialUuid {
    fn generate(&self) -> Result<String> {
        let next = self.next.fetch_add(1, Ordering::SeqCst);
        Ok(format!("00000000-0000-4000-8000-{next:012x}"))
    }
}

pub struct Harness {
    pub secrets: Arc<FakeSecretStore>,
    pub objects: FakeObjectStore,
    pub policy: Arc<FakePolicy>,
    pub topology: Arc<FakeTopology>,
}

impl Default for Harness {
    fn default() -> Self {
        let secrets = FakeSecretStore::default();
        secrets.insert(
            NAMESPACE,
            SECRET_NAME,
            btreemap! {
                "access-key".into() => "AKIA0000".into(),
                "secret-key".into() => "s3cr3t".into(),
                "res-conf-apikey".into() => "rc-key".into(),
            },
        );

        Self {
            secrets: Arc::new(secrets),
            objects: FakeObjectStore::default(),
            policy: Arc::default(),
            topology: Arc::default(),
        }
    }
}

impl Harness {
    pub fn args() -> ProvisionerArgs {
        ProvisionerArgs {
            cluster_id: CLUSTER_ID.into(),
            ..Default::default()
        }
    }

    pub fn provisioner(&self) -> Provisioner {
        self.provisioner_with(Self::args())
    }

    pub fn provisioner_with(&self, args: ProvisionerArgs) -> Provisioner {
        let ports = ProvisionerPorts {
            secrets: self.secrets.clone(),
            services: Arc::new(FakeServices),
            objects: Arc::new(self.objects.clone()),
            policy: self.policy.clone(),
            topology: self.topology.clone(),
            uuid: Arc::new(SequentialUuid::default()),
        };
        Provisioner::new(args, ports)
    }

    pub fn sessions(&self) -> usize {
        self.objects.with_state(|state| state.sessions)
    }
}

pub fn class_parameters() -> StringMap {
    btreemap! {
        "s3fs.ulagbulag.io/object-store-endpoint".into() => "https://s3.example.com".into(),
        "s3fs.ulagbulag.io/object-store-storage-class".into() => "us-standard".into(),
        "s3fs.ulagbulag.io/iam-endpoint".into() => "https://iam.example.com".into(),
        "s3fs.ulagbulag.io/chunk-size-mb".into() => "16".into(),
        "s3fs.ulagbulag.io/parallel-count".into() => "2".into(),
        "s3fs.ulagbulag.io/multireq-max".into() => "4".into(),
        "s3fs.ulagbulag.io/stat-cache-size".into() => "100000".into(),
        "s3fs.ulagbulag.io/debug-level".into() => "warn".into(),
    }
}

pub fn request(annotations: StringMap) -> ProvisionRequest {
    let mut claim_annotations = btreemap! {
        "s3fs.ulagbulag.io/secret-name".into() => SECRET_NAME.into(),
    };
    claim_annotations.extend(annotations);

    ProvisionRequest {
        claim_name: "data".into(),
        namespace: NAMESPACE.into(),
        capacity: Some("1Gi".into()),
        access_modes: vec!["ReadWriteOnce".into()],
        annotations: claim_annotations,
        parameters: class_parameters(),
        reclaim_policy: Some("Delete".into()),
        volume_name: "pvc-0001".into(),
    }
}
