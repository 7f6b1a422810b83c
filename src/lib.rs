//! Main crate for the `edgestack_helper` tools.
//!
//! Two binaries share this library:
//! - `edgestack-dns` keeps Cloudflare DNS records in line with the configured site list
//! - `edgestack-render` materializes the on-disk deployment artifacts for the stack
//!
//! The modules mirror that split:
//! - [`config`] loads the shared YAML document and the shell-style secrets file
//! - [`ipsource`] detects our public origin addresses through external probe endpoints
//! - [`desired`] turns configuration into the target DNS record set
//! - [`zones`] maps record names onto managed zones by longest suffix
//! - [`provider`] is the thin REST client for the DNS provider API
//! - [`reconcile`] diffs desired against live records and applies the result
//! - [`render`] renders the nginx/php-fpm/compose artifacts from templates

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod desired;
pub mod ipsource;
pub mod provider;
pub mod reconcile;
pub mod render;
pub mod types;
pub mod zones;
