use anyhow::{anyhow, Result};

pub fn infer<K, R>(key: K) -> Result<R>
where
    K: AsRef<str>,
    R: ::core::str::FromStr,
    <R as ::core::str::FromStr>::Err: 'static + Send + Sync + ::core::fmt::Display,
{
    let key = key.as_ref();

    infer_string(key).and_then(|e| {
        e.parse()
            .map_err(|error| anyhow!("failed to parse the environment variable ({key}): {error}"))
    })
}

pub fn infer_string<K>(key: K) -> Result<String>
where
    K: AsRef<str>,
{
    let key = key.as_ref();

    ::std::env::var(key).map_err(|_| anyhow!("failed to find the environment variable: {key}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_parses_value() {
        ::std::env::set_var("S3FS_CORE_TEST_INFER_U16", "8080");
        let value: u16 = infer("S3FS_CORE_TEST_INFER_U16").unwrap();
        assert_eq!(value, 8080);
    }

    #[test]
    fn infer_reports_key_on_parse_error() {
        ::std::env::set_var("S3FS_CORE_TEST_INFER_BAD", "eighty");
        let error = infer::<_, u16>("S3FS_CORE_TEST_INFER_BAD").unwrap_err();
        assert!(error.to_string().contains("S3FS_CORE_TEST_INFER_BAD"));
    }
}
