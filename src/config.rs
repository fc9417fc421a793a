use serde::Deserialize;

/// Classification thresholds are policy constants, not learned values.
/// Defaults follow the documented scoring framework: 70+ is SQL, 40-69 is MQL.
pub const DEFAULT_SQL_THRESHOLD: f64 = 70.0;
pub const DEFAULT_MQL_THRESHOLD: f64 = 40.0;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub search_base_url: String,
    pub search_api_key: String,
    pub crawl_base_url: String,
    pub crawl_api_key: String,
    pub llm_base_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub research_base_url: String,
    pub research_api_key: String,
    pub research_model: String,
    /// Per-request deadline for every outbound provider call, in seconds.
    pub request_timeout_secs: u64,
    /// Bounded retry count for the synthesis call before a run is failed.
    pub synthesis_max_retries: u32,
    /// Maximum concurrently executing workflow runs.
    pub worker_concurrency: usize,
    pub sql_threshold: f64,
    pub mql_threshold: f64,
}

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))
        .and_then(|v| {
            if v.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
            Ok(v)
        })
}

fn required_url(name: &str) -> anyhow::Result<String> {
    required(name).and_then(|url| {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            anyhow::bail!("{} must start with http:// or https://", name);
        }
        Ok(url)
    })
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            search_base_url: required_url("SEARCH_BASE_URL")?,
            search_api_key: required("SEARCH_API_KEY")?,
            crawl_base_url: required_url("CRAWL_BASE_URL")?,
            crawl_api_key: required("CRAWL_API_KEY")?,
            llm_base_url: required_url("LLM_BASE_URL")?,
            llm_api_key: required("LLM_API_KEY")?,
            llm_model: std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            research_base_url: required_url("RESEARCH_BASE_URL")?,
            research_api_key: required("RESEARCH_API_KEY")?,
            research_model: std::env::var("RESEARCH_MODEL")
                .unwrap_or_else(|_| "sonar-pro".to_string()),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("REQUEST_TIMEOUT_SECS must be a number"))?,
            synthesis_max_retries: std::env::var("SYNTHESIS_MAX_RETRIES")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SYNTHESIS_MAX_RETRIES must be a number"))?,
            worker_concurrency: std::env::var("WORKER_CONCURRENCY")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WORKER_CONCURRENCY must be a number"))?,
            sql_threshold: std::env::var("SQL_THRESHOLD")
                .ok()
                .map(|v| v.parse())
                .transpose()
                .map_err(|_| anyhow::anyhow!("SQL_THRESHOLD must be a number"))?
                .unwrap_or(DEFAULT_SQL_THRESHOLD),
            mql_threshold: std::env::var("MQL_THRESHOLD")
                .ok()
                .map(|v| v.parse())
                .transpose()
                .map_err(|_| anyhow::anyhow!("MQL_THRESHOLD must be a number"))?
                .unwrap_or(DEFAULT_MQL_THRESHOLD),
        };

        if config.mql_threshold >= config.sql_threshold {
            anyhow::bail!("MQL_THRESHOLD must be below SQL_THRESHOLD");
        }
        if config.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be at least 1");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Search provider: {}", config.search_base_url);
        tracing::debug!("Crawl provider: {}", config.crawl_base_url);
        tracing::debug!("LLM provider: {} ({})", config.llm_base_url, config.llm_model);
        tracing::debug!(
            "Research provider: {} ({})",
            config.research_base_url,
            config.research_model
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
