use anyhow::Result;
use aws_config::{meta::region::RegionProviderChain, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client as S3Client,
};
use tracing::info;

use crate::config::AppConfig;
use crate::storage::S3Storage;

async fn build_client(config: &AppConfig) -> Result<S3Client> {
    let region_provider = RegionProviderChain::first_try(Some(Region::new(config.aws_region.clone())))
        .or_default_provider()
        .or_else("us-east-1");

    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);

    if let Some(endpoint) = &config.aws_endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    // Static keys win over the ambient provider chain (MinIO in local setups).
    if let (Some(access_key), Some(secret_key)) = (
        config.aws_access_key_id.clone(),
        config.aws_secret_access_key.clone(),
    ) {
        loader = loader.credentials_provider(Credentials::new(
            access_key,
            secret_key,
            None,
            None,
            "closingdesk-env",
        ));
    }

    let shared = loader.load().await;
    let s3_config = S3ConfigBuilder::from(&shared)
        .force_path_style(config.aws_endpoint_url.is_some())
        .build();

    Ok(S3Client::from_conf(s3_config))
}

pub async fn contract_storage(config: &AppConfig) -> Result<S3Storage> {
    let client = build_client(config).await?;
    info!(
        bucket = %config.s3_bucket,
        endpoint = config.aws_endpoint_url.as_deref().unwrap_or("aws"),
        "contract storage configured"
    );
    Ok(S3Storage::new(client, config.s3_bucket.clone()))
}
