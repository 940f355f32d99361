use std::path::PathBuf;

use async_trait::async_trait;
use tokio::net::UnixStream;
use tonic::transport::{Endpoint, Uri};
use tower::service_fn;
use tracing::{info, instrument, Level};

use crate::error::{codes, ProviderError, Result};

#[async_trait]
pub trait TopologyService: Send + Sync {
    async fn get_cluster_type(&self, id: &str) -> Result<String>;

    /// Comma separated CIDRs of the cluster's service endpoints.
    async fn get_service_endpoints(&self, id: &str) -> Result<String>;
}

/// Queries the provider sidecar over its unix domain socket.
pub struct GrpcTopologyService {
    socket: PathBuf,
}

impl GrpcTopologyService {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    async fn connect(&self) -> Result<self::proto::ProviderClient> {
        let socket = self.socket.clone();
        // the authority is ignored; every connection dials the socket
        let channel = Endpoint::try_from("http://[::]:50051")
            .map_err(|error| ProviderError::new(format!("invalid provider endpoint: {error}")))?
            .connect_with_connector(service_fn(move |_: Uri| {
                UnixStream::connect(socket.clone())
            }))
            .await
            .map_err(|error| {
                ProviderError::new(format!(
                    "failed to establish grpc connection ({socket}): {error}",
                    socket = self.socket.display(),
                ))
                .with_code(codes::UNAVAILABLE)
            })?;
        Ok(self::proto::ProviderClient::new(channel))
    }
}

#[async_trait]
impl TopologyService for GrpcTopologyService {
    #[instrument(level = Level::INFO, skip(self), err(Display))]
    async fn get_cluster_type(&self, id: &str) -> Result<String> {
        let reply = self
            .connect()
            .await?
            .get_provider_type(self::proto::ProviderTypeRequest { id: id.into() })
            .await
            .map_err(|status| from_status("GetProviderType", status))?;
        info!("cluster type: {}", &reply.r#type);
        Ok(reply.r#type)
    }

    #[instrument(level = Level::INFO, skip(self), err(Display))]
    async fn get_service_endpoints(&self, id: &str) -> Result<String> {
        let reply = self
            .connect()
            .await?
            .get_vpc_svc_endpoint(self::proto::VpcSvcEndpointRequest { id: id.into() })
            .await
            .map_err(|status| from_status("GetVPCSvcEndpoint", status))?;
        info!("service endpoints: {}", &reply.cse);
        Ok(reply.cse)
    }
}

fn from_status(method: &str, status: ::tonic::Status) -> ProviderError {
    let error = ProviderError::new(format!("error {method} failed: {status}"));
    match status.code() {
        ::tonic::Code::Unavailable => error.with_code(codes::UNAVAILABLE),
        ::tonic::Code::DeadlineExceeded | ::tonic::Code::ResourceExhausted => ProviderError {
            transient: true,
            ..error
        },
        _ => error,
    }
}

/// Messages and client of the `provider.IBMProvider` service.
pub mod proto {
    use tonic::{
        codec::ProstCodec,
        codegen::http::uri::PathAndQuery,
        transport::Channel,
        GrpcMethod, IntoRequest, Status,
    };

    const SERVICE: &str = "provider.IBMProvider";

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ProviderTypeRequest {
        #[prost(string, tag = "1")]
        pub id: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ProviderTypeReply {
        #[prost(string, tag = "1")]
        pub r#type: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct VpcSvcEndpointRequest {
        #[prost(string, tag = "1")]
        pub id: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct VpcSvcEndpointReply {
        #[prost(string, tag = "1")]
        pub cse: String,
    }

    pub struct ProviderClient {
        inner: ::tonic::client::Grpc<Channel>,
    }

    impl ProviderClient {
        pub fn new(channel: Channel) -> Self {
            Self {
                inner: ::tonic::client::Grpc::new(channel),
            }
        }

        pub async fn get_provider_type(
            &mut self,
            request: ProviderTypeRequest,
        ) -> Result<ProviderTypeReply, Status> {
            self.unary(request, "GetProviderType", "/provider.IBMProvider/GetProviderType")
                .await
        }

        pub async fn get_vpc_svc_endpoint(
            &mut self,
            request: VpcSvcEndpointRequest,
        ) -> Result<VpcSvcEndpointReply, Status> {
            self.unary(
                request,
                "GetVPCSvcEndpoint",
                "/provider.IBMProvider/GetVPCSvcEndpoint",
            )
            .await
        }

        async fn unary<Req, Res>(
            &mut self,
            request: Req,
            method: &'static str,
            path: &'static str,
        ) -> Result<Res, Status>
        where
            Req: ::prost::Message + Send + Sync + 'static,
            Res: ::prost::Message + Default + Send + Sync + 'static,
        {
            self.inner
                .ready()
                .await
                .map_err(|error| Status::unknown(format!("service was not ready: {error}")))?;

            let mut request = request.into_request();
            request
                .extensions_mut()
                .insert(GrpcMethod::new(SERVICE, method));
            self.inner
                .unary(
                    request,
                    PathAndQuery::from_static(path),
                    ProstCodec::<Req, Res>::default(),
                )
                .await
                .map(::tonic::Response::into_inner)
        }
    }
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::*;

    #[test]
    fn reply_decodes_from_wire_bytes() {
        // field 1, length delimited, "vpc-gen2"
        let mut bytes = vec![0x0a, 0x08];
        bytes.extend_from_slice(b"vpc-gen2");
        let reply = proto::ProviderTypeReply::decode(bytes.as_slice()).unwrap();
        assert_eq!(reply.r#type, "vpc-gen2");
    }

    #[test]
    fn unavailable_sidecar_is_tagged() {
        let error = from_status("GetProviderType", ::tonic::Status::unavailable("down"));
        assert!(error.has_code(codes::UNAVAILABLE));
        assert!(!error.transient);
        assert!(error.message.starts_with("error GetProviderType failed"));
    }

    #[tokio::test]
    async fn missing_socket_is_unavailable() {
        let service = GrpcTopologyService::new("/nonexistent/provider.sock");
        let error = service.get_cluster_type("cluster").await.unwrap_err();
        assert!(error.has_code(codes::UNAVAILABLE));
    }
}
