use std::{future::Future, sync::Arc};

use s3fs_api::{
    annotations::{ClaimAnnotations, ClassParameters},
    credentials::ResolvedSecret,
    options::{self, ResolvedOptions},
    request::ProvisionRequest,
    volume::ProvisionedVolume,
};
use s3fs_provider::{
    error::codes, CreateBucketOptions, ObjectStorageSession, ObjectStorageSessionFactory,
    PolicyService, ProviderError, SecretStore, ServiceResolver, TopologyService, UuidGenerator,
};
use tokio::time::Instant;
use tracing::{info, instrument, Level};

use crate::{
    args::ProvisionerArgs,
    credentials::CredentialResolver,
    decision::BucketLifecycleDecision,
    error::{ErrorContext, ErrorKind, ProvisionError, ProvisionState},
    merge::{merge, parse_bool},
    namer::BucketNamer,
    policy::{compensate, AccessPolicyCoordinator, PolicyPlan},
    topology::ClusterTopologyClient,
};

/// Every external collaborator of a [`Provisioner`].
#[derive(Clone)]
pub struct ProvisionerPorts {
    pub secrets: Arc<dyn SecretStore>,
    pub services: Arc<dyn ServiceResolver>,
    pub objects: Arc<dyn ObjectStorageSessionFactory>,
    pub policy: Arc<dyn PolicyService>,
    pub topology: Arc<dyn TopologyService>,
    pub uuid: Arc<dyn UuidGenerator>,
}

#[derive(Clone)]
pub struct Provisioner {
    args: ProvisionerArgs,
    credentials: CredentialResolver,
    namer: BucketNamer,
    objects: Arc<dyn ObjectStorageSessionFactory>,
    policy: AccessPolicyCoordinator,
    services: Arc<dyn ServiceResolver>,
}

impl Provisioner {
    pub fn new(args: ProvisionerArgs, ports: ProvisionerPorts) -> Self {
        let ProvisionerPorts {
            secrets,
            services,
            objects,
            policy,
            topology,
            uuid,
        } = ports;
        let topology = ClusterTopologyClient::new(topology, args.provider_name.clone());

        Self {
            credentials: CredentialResolver::new(secrets),
            namer: BucketNamer::new(uuid),
            objects,
            policy: AccessPolicyCoordinator::new(policy, topology),
            services,
            args,
        }
    }

    pub const fn args(&self) -> &ProvisionerArgs {
        &self.args
    }

    #[instrument(
        level = Level::INFO,
        skip_all,
        fields(claim = %request.claim_name, namespace = %request.namespace),
        err(Display)
    )]
    pub async fn provision(
        &self,
        request: &ProvisionRequest,
    ) -> Result<ProvisionedVolume, ProvisionError> {
        let mut state = ProvisionState::default();
        let result = self.try_provision(request, &mut state).await;
        result.map_err(|kind| self.error(&request.claim_name, state, kind))
    }

    #[instrument(
        level = Level::INFO,
        skip_all,
        fields(volume = %volume.name),
        err(Display)
    )]
    pub async fn delete(&self, volume: &ProvisionedVolume) -> Result<(), ProvisionError> {
        let mut state = ProvisionState::default();
        let deadline = Instant::now() + self.args.timeout();
        let result = self
            .with_deadline(deadline, self.try_delete(volume, &mut state))
            .await;
        result.map_err(|kind| self.error(&volume.name, state, kind))
    }

    async fn with_deadline<T>(
        &self,
        deadline: Instant,
        task: impl Future<Output = Result<T, ErrorKind>>,
    ) -> Result<T, ErrorKind> {
        ::tokio::time::timeout_at(deadline, task)
            .await
            .unwrap_or_else(|_| Err(ErrorKind::timeout(self.args.timeout())))
    }

    fn error(&self, claim: &str, state: ProvisionState, kind: ErrorKind) -> ProvisionError {
        ProvisionError {
            context: ErrorContext {
                claim: claim.into(),
                cluster_id: self.args.cluster_id.clone(),
                state,
            },
            kind,
        }
    }

    async fn try_provision(
        &self,
        request: &ProvisionRequest,
        state: &mut ProvisionState,
    ) -> Result<ProvisionedVolume, ErrorKind> {
        let deadline = Instant::now() + self.args.timeout();
        let SettledBucket {
            claim,
            options,
            decision,
            plan,
            session,
            access_mode,
        } = self
            .with_deadline(deadline, self.settle_bucket(request, state))
            .await?;
        let session = session.as_deref();

        let finish = self.finish(&decision, &options, &plan, session, state);
        match ::tokio::time::timeout_at(deadline, finish).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(match session {
                    Some(session) if decision.delete_on_failure => {
                        self.rollback_on_deadline(session, &options.bucket).await
                    }
                    _ => ErrorKind::timeout(self.args.timeout()),
                });
            }
        }

        info!("provisioned volume {} on bucket {}", &request.volume_name, &options.bucket);
        to_provisioned_volume(request, claim, &options, access_mode)
    }

    /// Validates the request and makes sure the bucket exists.
    async fn settle_bucket(
        &self,
        request: &ProvisionRequest,
        state: &mut ProvisionState,
    ) -> Result<SettledBucket, ErrorKind> {
        // Validating
        let claim = ClaimAnnotations::from_map(&request.annotations).map_err(|error| {
            ErrorKind::configuration(format!("cannot parse claim annotations: {error}"))
        })?;
        let class = ClassParameters::from_map(&request.parameters).map_err(|error| {
            ErrorKind::configuration(format!("cannot parse storage class parameters: {error}"))
        })?;
        let mut options = merge(&claim, &class, &request.namespace, &*self.services).await?;
        let mut decision = BucketLifecycleDecision::new(&self.args, &options);

        if !self.args.allow_cross_ns_secret && options.secret_namespace != request.namespace {
            return Err(ErrorKind::Authorization(format!(
                "cross-namespace secret {namespace}/{name} is not allowed for PVC in {claim_namespace} namespace",
                namespace = &options.secret_namespace,
                name = &options.secret_name,
                claim_namespace = &request.namespace,
            )));
        }
        if request.access_modes.len() > 1 {
            return Err(ErrorKind::configuration(
                "More than one access mode is not supported",
            ));
        }
        let access_mode = request.access_modes.first().cloned();

        if options.auto_delete_bucket {
            options.bucket = self.namer.generate()?;
            info!("generated bucket name: {}", &options.bucket);
        }

        let secret = if decision.needs_credentials() {
            Some(
                self.credentials
                    .resolve(
                        &options.secret_name,
                        &options.secret_namespace,
                        &options.iam_endpoint,
                    )
                    .await?,
            )
        } else {
            None
        };
        *state = ProvisionState::CredentialResolved;

        decision.authorize(secret.as_ref(), &request.namespace)?;
        *state = ProvisionState::NamespaceChecked;

        let plan = self
            .policy
            .prepare(
                &decision,
                &options,
                secret.as_ref(),
                request.capacity.as_deref(),
            )
            .await?;

        let session = match &secret {
            Some(secret) if decision.validate_bucket => {
                let service = options.cos_service.as_ref().map(|service| service.name.as_str());
                let ca_bundle = secret.ca_bundle_for(service);
                let session = self
                    .objects
                    .new_session(
                        &options.endpoint,
                        options.storage_class.as_deref(),
                        &secret.credentials,
                        ca_bundle.as_ref(),
                    )
                    .await
                    .map_err(|error| {
                        ErrorKind::external("cannot create object storage session", error)
                    })?;
                Some(session)
            }
            _ => None,
        };

        let created_fresh = match (decision.create_bucket, session.as_deref(), &secret) {
            (true, Some(session), Some(secret)) => {
                self.create_bucket(session, secret, &mut options).await?
            }
            (true, _, _) => {
                return Err(ErrorKind::configuration(
                    "cannot create bucket without object storage credentials",
                ))
            }
            (false, _, _) if options.bucket.is_empty() => {
                return Err(ErrorKind::configuration("bucket name not specified"))
            }
            (false, _, _) => false,
        };
        decision.delete_on_failure = created_fresh;

        Ok(SettledBucket {
            claim,
            options,
            decision,
            plan,
            session,
            access_mode,
        })
    }

    /// Configures a settled bucket. Any failure deletes a bucket created by
    /// this call.
    async fn finish(
        &self,
        decision: &BucketLifecycleDecision,
        options: &ResolvedOptions,
        plan: &PolicyPlan,
        session: Option<&dyn ObjectStorageSession>,
        state: &mut ProvisionState,
    ) -> Result<(), ErrorKind> {
        let bucket = options.bucket.as_str();
        let fresh_session = session.filter(|_| decision.delete_on_failure);

        if let Some(session) = fresh_session.filter(|_| options.bucket_versioning) {
            if let Err(error) = session.set_bucket_versioning(bucket, true).await {
                let cause = ErrorKind::external(
                    format!("cannot enable versioning for bucket {bucket}"),
                    error,
                );
                return Err(compensate(session, bucket, cause).await);
            }
            info!("enabled versioning for bucket {bucket}");
        }
        *state = ProvisionState::BucketSettled;

        self.policy
            .apply(plan, bucket, decision.delete_on_failure, session)
            .await?;
        *state = ProvisionState::PolicyApplied;

        if let Some(session) = session {
            if let Err(cause) = check_bucket(session, bucket, options.object_path.as_deref()).await
            {
                return Err(match fresh_session {
                    Some(session) => compensate(session, bucket, cause).await,
                    None => cause,
                });
            }
        }
        *state = ProvisionState::Complete;
        Ok(())
    }

    /// Deletes a fresh bucket once the provisioning deadline has passed.
    async fn rollback_on_deadline(
        &self,
        session: &dyn ObjectStorageSession,
        bucket: &str,
    ) -> ErrorKind {
        let timeout = self.args.timeout();
        let cause = ErrorKind::timeout(timeout);
        match ::tokio::time::timeout(timeout, compensate(session, bucket, cause)).await {
            Ok(kind) => kind,
            Err(_) => ErrorKind::Compensation {
                bucket: bucket.into(),
                cause: Box::new(ErrorKind::timeout(timeout)),
                rollback: ProviderError::transient(format!(
                    "deadline exceeded after {timeout:?}"
                )),
            },
        }
    }

    /// Creates the bucket, returning whether this call created it.
    async fn create_bucket(
        &self,
        session: &dyn ObjectStorageSession,
        secret: &ResolvedSecret,
        options: &mut ResolvedOptions,
    ) -> Result<bool, ErrorKind> {
        if options.bucket.is_empty() {
            options.bucket = self.namer.generate()?;
            info!("generated bucket name: {}", &options.bucket);
        }
        let bucket = options.bucket.as_str();

        if secret.credentials.service_instance_id() == Some("") {
            return Err(ErrorKind::credential(
                "cannot create bucket using API key without service-instance-id",
            ));
        }

        let create_options = CreateBucketOptions {
            kp_root_key_crn: secret.kp_root_key_crn.clone(),
        };
        match session.create_bucket(bucket, &create_options).await {
            Ok(()) => {
                info!("created bucket {bucket}");
                Ok(true)
            }
            Err(error) if error.is_bucket_already_existing() => {
                info!("bucket {bucket} already exists");
                Ok(false)
            }
            Err(error) => Err(ErrorKind::external(
                format!("cannot create bucket {bucket}"),
                error,
            )),
        }
    }

    async fn try_delete(
        &self,
        volume: &ProvisionedVolume,
        state: &mut ProvisionState,
    ) -> Result<(), ErrorKind> {
        let annotations = ClaimAnnotations::from_map(&volume.annotations).map_err(|error| {
            ErrorKind::configuration(format!("cannot parse volume annotations: {error}"))
        })?;

        let auto_delete_bucket = annotations.auto_delete_bucket.as_deref().unwrap_or_default();
        if auto_delete_bucket != "true" {
            return parse_bool(auto_delete_bucket)
                .map(|_| info!("keeping the bucket of volume {}", &volume.name))
                .map_err(|_| {
                    ErrorKind::configuration(
                        "invalid value for auto-delete-bucket, expects true/false",
                    )
                });
        }

        let cos_service = annotations.cos_service;
        let bucket = annotations
            .bucket
            .ok_or_else(|| ErrorKind::configuration("bucket name not specified"))?;
        let secret_name = annotations
            .secret_name
            .unwrap_or_else(|| volume.secret_name.clone());
        let secret_namespace = annotations
            .secret_namespace
            .unwrap_or_else(|| volume.secret_namespace.clone());
        let driver_option = |key: &str| volume.driver_options.get(key).map(String::as_str);

        let secret = self
            .credentials
            .resolve(
                &secret_name,
                &secret_namespace,
                driver_option(options::keys::IAM_ENDPOINT).unwrap_or_default(),
            )
            .await?;
        *state = ProvisionState::CredentialResolved;

        let ca_bundle = secret.ca_bundle_for(cos_service.as_deref());
        let session = self
            .objects
            .new_session(
                driver_option(options::keys::ENDPOINT).unwrap_or_default(),
                driver_option(options::keys::STORAGE_CLASS),
                &secret.credentials,
                ca_bundle.as_ref(),
            )
            .await
            .map_err(|error| ErrorKind::external("cannot create object storage session", error))?;

        match session.delete_bucket(&bucket).await {
            Ok(()) => info!("deleted bucket {bucket}"),
            Err(error) if error.has_code(codes::NO_SUCH_BUCKET) => {
                info!("bucket {bucket} is already gone")
            }
            Err(error) => {
                return Err(ErrorKind::external(
                    format!("cannot delete bucket {bucket}"),
                    error,
                ))
            }
        }
        *state = ProvisionState::Complete;
        Ok(())
    }
}

async fn check_bucket(
    session: &dyn ObjectStorageSession,
    bucket: &str,
    object_path: Option<&str>,
) -> Result<(), ErrorKind> {
    let inaccessible =
        |error| ErrorKind::external(format!("cannot access bucket {bucket}"), error);

    session
        .check_bucket_access(bucket)
        .await
        .map_err(inaccessible)?;

    let Some(object_path) = object_path else {
        return Ok(());
    };
    let exists = session
        .check_object_path_existence(bucket, object_path)
        .await
        .map_err(inaccessible)?;
    if exists {
        Ok(())
    } else {
        Err(ErrorKind::configuration(format!(
            "object-path {object_path:?} not found inside bucket {bucket}"
        )))
    }
}

struct SettledBucket {
    claim: ClaimAnnotations,
    options: ResolvedOptions,
    decision: BucketLifecycleDecision,
    plan: PolicyPlan,
    session: Option<Box<dyn ObjectStorageSession>>,
    access_mode: Option<String>,
}

fn to_provisioned_volume(
    request: &ProvisionRequest,
    claim: ClaimAnnotations,
    options: &ResolvedOptions,
    access_mode: Option<String>,
) -> Result<ProvisionedVolume, ErrorKind> {
    let canonical = |value: Option<bool>| value.map(|value| value.to_string());

    let persisted = ClaimAnnotations {
        auto_create_bucket: canonical(Some(options.auto_create_bucket)),
        auto_delete_bucket: canonical(Some(options.auto_delete_bucket)),
        bucket: Some(options.bucket.clone()),
        bucket_versioning: canonical(Some(options.bucket_versioning)),
        configure_firewall: canonical(options.configure_firewall),
        endpoint: Some(options.endpoint.clone()),
        iam_endpoint: Some(options.iam_endpoint.clone()),
        quota_limit: canonical(options.quota_limit),
        region: options.storage_class.clone(),
        secret_name: Some(options.secret_name.clone()),
        secret_namespace: Some(options.secret_namespace.clone()),
        ..claim
    };
    let annotations = persisted.to_map().map_err(|error| {
        ErrorKind::configuration(format!("cannot serialize volume annotations: {error}"))
    })?;
    let driver_options = options
        .to_driver_options(access_mode)
        .to_map()
        .map_err(|error| {
            ErrorKind::configuration(format!("cannot serialize driver options: {error}"))
        })?;

    Ok(ProvisionedVolume {
        name: request.volume_name.clone(),
        annotations,
        driver_options,
        secret_name: options.secret_name.clone(),
        secret_namespace: options.secret_namespace.clone(),
        capacity: request.capacity.clone(),
        access_modes: request.access_modes.clone(),
        reclaim_policy: request.reclaim_policy.clone(),
    })
}
