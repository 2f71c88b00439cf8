use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DATABASE: &str = "tabletop";
const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;

#[derive(Clone)]
pub struct MongoConfig {
    pub options: ClientOptions,
    pub database_name: String,
    /// Pings tried before the initial connection is given up.
    pub connect_attempts: u32,
}

impl MongoConfig {
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let database_name = db_name.unwrap_or(DEFAULT_DATABASE).to_owned();
        let options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;

        Ok(Self {
            options,
            database_name,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
        })
    }

    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts.max(1);
        self
    }

    /// Read `MONGO_URI`, the optional `MONGO_DB` and the optional `MONGO_CONNECT_ATTEMPTS`.
    pub async fn from_env() -> MongoResult<Self> {
        let uri = std::env::var("MONGO_URI")
            .map_err(|_| MongoDaoError::MissingEnvVar { var: "MONGO_URI" })?;
        let db = std::env::var("MONGO_DB").ok();
        let config = Self::from_uri(&uri, db.as_deref()).await?;

        match std::env::var("MONGO_CONNECT_ATTEMPTS") {
            Ok(value) => {
                let attempts = parse_attempts(&value).ok_or(MongoDaoError::InvalidEnvVar {
                    var: "MONGO_CONNECT_ATTEMPTS",
                    value,
                })?;
                Ok(config.with_connect_attempts(attempts))
            }
            Err(_) => Ok(config),
        }
    }
}

fn parse_attempts(value: &str) -> Option<u32> {
    value.trim().parse().ok().filter(|attempts| *attempts > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn uri_config_uses_tabletop_defaults() {
        let config = MongoConfig::from_uri("mongodb://localhost:27017", None)
            .await
            .unwrap();
        assert_eq!(config.database_name, "tabletop");
        assert_eq!(config.connect_attempts, 5);

        let config = MongoConfig::from_uri("mongodb://localhost:27017", Some("exercise"))
            .await
            .unwrap()
            .with_connect_attempts(0);
        assert_eq!(config.database_name, "exercise");
        assert_eq!(config.connect_attempts, 1);
    }

    #[test]
    fn attempt_counts_must_be_positive() {
        assert_eq!(parse_attempts(" 12 "), Some(12));
        assert_eq!(parse_attempts("0"), None);
        assert_eq!(parse_attempts("many"), None);
    }
}
