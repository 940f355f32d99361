use strum::Display;

#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, Hash)]
#[strum(serialize_all = "kebab-case")]
pub enum ClusterType {
    #[strum(serialize = "vpc-gen2")]
    VpcGen2,
    Classic,
    Unknown,
}

impl ClusterType {
    /// Classifies a provider type string by substring, so that decorated
    /// values such as `vpc-gen2-private` still match.
    pub fn from_provider_type(provider_type: &str) -> Self {
        if provider_type.contains("vpc-gen2") {
            Self::VpcGen2
        } else if provider_type.contains("classic") {
            Self::Classic
        } else {
            Self::Unknown
        }
    }

    pub const fn supports_firewall(&self) -> bool {
        matches!(self, Self::VpcGen2)
    }
}
