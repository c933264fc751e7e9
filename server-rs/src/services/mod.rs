pub mod cloudinary;
pub mod dns;
pub mod domains;
pub mod email;
pub mod hostname;
pub mod rewrite;
pub mod stripe_service;
pub mod subdomain;
pub mod tenant_resolver;
pub mod vercel;
