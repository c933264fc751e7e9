use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub app_env: String,
    pub cors_origins: Vec<String>,
    pub routing: RoutingConfig,
    pub db: DbConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub dns: DnsConfig,
    pub vercel: Option<VercelConfig>,
    pub stripe: Option<StripeConfig>,
    pub email: Option<EmailConfig>,
    pub cloudinary: Option<CloudinaryConfig>,
}

#[derive(Clone, Debug)]
pub struct RoutingConfig {
    pub root_domain: String,
    pub product_slug: String,
    pub development: bool,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct DbConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub pool_min: u32,
    pub pool_max: u32,
    pub run_migrations: bool,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub audience: String,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
    /// Tracked client windows before the oldest are evicted.
    pub max_clients: usize,
    /// Key anonymous clients by `X-Forwarded-For`. Only safe behind a proxy
    /// that overwrites the header.
    pub trust_proxy: bool,
}

#[derive(Clone, Debug)]
pub struct DnsConfig {
    pub resolver_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct VercelConfig {
    pub api_token: String,
    pub project_id: String,
    pub team_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub price_starter: String,
    pub price_pro: String,
    pub trial_days: u32,
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub api_key: String,
    pub from: String,
}

#[derive(Clone, Debug)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    /// Empty values count as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false)
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = Lookup(lookup);
        let port = env.parse_or("PORT", 3000);
        let app_env = env.or("APP_ENV", "development").to_ascii_lowercase();
        let development = app_env != "production";

        let vercel = match (env.get("VERCEL_API_TOKEN"), env.get("VERCEL_PROJECT_ID")) {
            (Some(api_token), Some(project_id)) => Some(VercelConfig {
                api_token,
                project_id,
                team_id: env.get("VERCEL_TEAM_ID"),
            }),
            _ => None,
        };

        let stripe = env.get("STRIPE_SECRET_KEY").map(|secret_key| StripeConfig {
            secret_key,
            webhook_secret: env.or("STRIPE_WEBHOOK_SECRET", ""),
            price_starter: env.or("STRIPE_PRICE_STARTER", ""),
            price_pro: env.or("STRIPE_PRICE_PRO", ""),
            trial_days: env.parse_or("STRIPE_TRIAL_DAYS", 14),
        });

        let email = env.get("RESEND_API_KEY").map(|api_key| EmailConfig {
            api_key,
            from: env.or("EMAIL_FROM", "TallyRoster <noreply@tallyroster.com>"),
        });

        let cloudinary = match (
            env.get("CLOUDINARY_CLOUD_NAME"),
            env.get("CLOUDINARY_API_KEY"),
            env.get("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
            }),
            _ => None,
        };

        Self {
            port,
            app_env,
            cors_origins: env
                .or("CORS_ORIGINS", "http://localhost:3000")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            routing: RoutingConfig {
                root_domain: env
                    .or("ROOT_DOMAIN", "tallyroster.com")
                    .trim_end_matches('.')
                    .to_ascii_lowercase(),
                product_slug: env.or("PRODUCT_SLUG", "tallyroster").to_ascii_lowercase(),
                development,
                port,
            },
            db: DbConfig {
                url: env.get("DATABASE_URL").or_else(|| env.get("POSTGRES_URL")),
                host: env.or("DB_HOST", "localhost"),
                port: env.parse_or("DB_PORT", 5432),
                database: env.or("DB_NAME", "tallyroster"),
                user: env.or("DB_USER", "tallyroster"),
                password: env.or("DB_PASSWORD", ""),
                pool_min: env.parse_or("DB_POOL_MIN", 1),
                pool_max: env.parse_or("DB_POOL_MAX", 10),
                run_migrations: env.flag("RUN_MIGRATIONS"),
            },
            auth: AuthConfig {
                jwt_secret: env.or("AUTH_JWT_SECRET", "change-me-to-the-auth-provider-secret"),
                audience: env.or("AUTH_JWT_AUDIENCE", "authenticated"),
            },
            rate_limit: RateLimitConfig {
                window_secs: 60,
                max_requests: env.parse_or("RATE_LIMIT_MAX", 120),
                max_clients: env.parse_or("RATE_LIMIT_MAX_CLIENTS", 10_000),
                trust_proxy: env.flag("RATE_LIMIT_TRUST_PROXY"),
            },
            dns: DnsConfig {
                resolver_url: env.or("DNS_RESOLVER_URL", "https://dns.google/resolve"),
                timeout_secs: env.parse_or("DNS_TIMEOUT_SECS", 10),
            },
            vercel,
            stripe,
            email,
            cloudinary,
        }
    }

    pub fn is_production(&self) -> bool {
        !self.routing.development
    }

    pub fn database_url(&self) -> String {
        if let Some(url) = &self.db.url {
            return url.clone();
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db.user, self.db.password, self.db.host, self.db.port, self.db.database
        )
    }

    /// Where unresolvable hosts are sent.
    pub fn root_url(&self) -> String {
        self.routing.root_url()
    }

    pub fn warn_missing_integrations(&self) {
        if self.vercel.is_none() {
            tracing::warn!("VERCEL_API_TOKEN/VERCEL_PROJECT_ID not set; custom domains will not be registered with the hosting platform");
        }
        if self.stripe.is_none() {
            tracing::warn!("STRIPE_SECRET_KEY not set; billing is disabled");
        }
        if self.email.is_none() {
            tracing::warn!("RESEND_API_KEY not set; emails will not be sent");
        }
        if self.cloudinary.is_none() {
            tracing::warn!("Cloudinary credentials not set; image uploads are disabled");
        }
        if self.is_production() && self.auth.jwt_secret.starts_with("change-me") {
            tracing::warn!("AUTH_JWT_SECRET is not set in production");
        }
    }
}

impl RoutingConfig {
    pub fn root_url(&self) -> String {
        if self.development {
            format!("http://localhost:{}/", self.port)
        } else {
            format!("https://{}/", self.root_domain)
        }
    }

    /// `{sub}.{root}`, the CNAME target tenants point custom domains at.
    pub fn site_host(&self, subdomain: &str) -> String {
        format!("{}.{}", subdomain, self.root_domain)
    }

    pub fn site_url(&self, subdomain: &str) -> String {
        if self.development {
            format!("http://{}.localhost:{}", subdomain, self.port)
        } else {
            format!("https://{}", self.site_host(subdomain))
        }
    }

    pub fn verification_record_name(&self, domain: &str) -> String {
        format!("_{}-verify.{}", self.product_slug, domain)
    }
}
