use anyhow::{Context, Result};
use hyper::header::AUTHORIZATION;
use hyper::{Body, Method, Request};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::commands::{ClientCommand, TokenCommand};
use crate::common::config::{client_request_timeout, GeneratorConfig};
use crate::common::http::{build_http_client, send_with_timeout};
use crate::common::SubjectToken;
use aws::DefaultCredentialSource;
use generator::TokenGenerator;

pub mod aws;
pub mod generator;
pub mod signer;

/// Resolve credentials from the default chain and produce a token for `config`
async fn generate(config: &GeneratorConfig) -> Result<SubjectToken> {
    let credentials = Arc::new(DefaultCredentialSource::load().await);
    let generator = TokenGenerator::new(credentials).with_sts_endpoint(config.sts_endpoint.clone());
    generate_with(&generator, config).await
}

async fn generate_with(generator: &TokenGenerator, config: &GeneratorConfig) -> Result<SubjectToken> {
    generator
        .generate_subject_token(&config.audience, &config.region)
        .await
        .context("Failed to generate subject token")
}

/// Print a subject token to stdout
pub async fn run_token(args: TokenCommand) -> Result<()> {
    let config = GeneratorConfig::from_token_command(&args)?;

    info!("🔏 Signing GetCallerIdentity for region {}", config.region);
    info!("🎯 Audience: {}", config.audience);

    let token = generate(&config).await?;
    println!("{}", token.as_str());

    Ok(())
}

/// Send one HTTP request, optionally authenticated with a subject token
pub async fn run(args: ClientCommand) -> Result<()> {
    let generator_config = GeneratorConfig::from_client_command(&args)?;
    let request_timeout = client_request_timeout(&args)?;

    let uri = hyper::Uri::from_str(&args.url).with_context(|| format!("Invalid URL {}", args.url))?;
    let method = Method::from_str(&args.method.to_ascii_uppercase())
        .with_context(|| format!("Invalid method {}", args.method))?;

    let mut request_builder = Request::builder().method(method).uri(uri);

    if let Some(config) = &generator_config {
        let token = generate(config).await?;
        request_builder = request_builder.header(AUTHORIZATION, token.authorization_value());
        info!("Added AWS federated identity authorization header");
    }

    let body = match &args.body {
        Some(body) if !body.is_empty() => Body::from(body.clone()),
        _ => Body::empty(),
    };
    let request = request_builder.body(body)?;

    info!("Request headers:");
    for (name, value) in request.headers() {
        if name == AUTHORIZATION {
            info!("  {}: <{} bytes>", name, value.len());
        } else {
            info!("  {}: {}", name, value.to_str().unwrap_or("<binary>"));
        }
    }

    let http_client = build_http_client();
    let response = send_with_timeout(&http_client, request, request_timeout)
        .await
        .context("Request failed")?;

    println!("Status: {}", response.status.as_u16());
    println!("Headers:");
    for (name, value) in &response.headers {
        println!("{}: {}", name, value);
    }
    println!();
    println!("{}", response.body);

    Ok(())
}
