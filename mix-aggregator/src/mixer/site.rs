use interfaces::{Config, MixOpt};
use tracing::debug;

use super::{mix_arrays, mix_scalar, resolve_relative, ResolveRelative};
use crate::codec::site::{Doh, Live, MultiRepo, Parse, RepoUrl, Rule, Site, SiteRepo};
use crate::traits::Sourcer;
use crate::types::Result;

/// Name of the entry a multi repo gets for this proxy's own merged repo.
pub const SELF_REPO_NAME: &str = "MixProxy";
pub const SELF_REPO_PATH: &str = "/v1/tvbox/repo";

fn resolve_field(field: &mut String, origin: &str) {
    if field.starts_with("./") {
        *field = resolve_relative(field, origin);
    }
}

impl ResolveRelative for Site {
    fn resolve_relative(mut self, origin: &str) -> Self {
        resolve_field(&mut self.api, origin);
        resolve_field(&mut self.jar, origin);
        if let Some(serde_json::Value::String(ext)) = &mut self.ext {
            resolve_field(ext, origin);
        }
        self
    }
}

impl ResolveRelative for Live {
    fn resolve_relative(mut self, origin: &str) -> Self {
        resolve_field(&mut self.url, origin);
        self
    }
}

impl ResolveRelative for Doh {
    fn resolve_relative(mut self, origin: &str) -> Self {
        resolve_field(&mut self.url, origin);
        self
    }
}

impl ResolveRelative for Parse {
    fn resolve_relative(mut self, origin: &str) -> Self {
        resolve_field(&mut self.url, origin);
        self
    }
}

impl ResolveRelative for RepoUrl {
    fn resolve_relative(mut self, origin: &str) -> Self {
        resolve_field(&mut self.url, origin);
        self
    }
}

impl ResolveRelative for Rule {
    fn resolve_relative(self, _origin: &str) -> Self {
        self
    }
}

/// Scalar rule result, or `None` when the rule is off or names no source.
async fn mix_optional_scalar<S>(rule: &MixOpt, fallback: &str, sourcer: &S) -> Result<Option<(String, String)>>
where
    S: Sourcer + ?Sized,
{
    if rule.disabled || rule.resolve_source_name(fallback).is_empty() {
        return Ok(None);
    }
    let (value, source) = mix_scalar(rule, fallback, sourcer).await?;
    Ok((!value.is_empty()).then_some((value, source.url)))
}

/// The spider URL the merged repository advertises, made absolute.
pub async fn mix_spider<S>(config: &Config, sourcer: &S) -> Result<Option<String>>
where
    S: Sourcer + ?Sized,
{
    let opt = &config.tvbox_single_repo_opt;
    let spider = mix_optional_scalar(&opt.spider, opt.fallback_source(), sourcer).await?;
    Ok(spider.map(|(value, origin)| resolve_relative(&value, &origin)))
}

pub async fn mix_site_repo<S>(config: &Config, sourcer: &S) -> Result<SiteRepo>
where
    S: Sourcer + ?Sized,
{
    let opt = &config.tvbox_single_repo_opt;
    let fallback = opt.fallback_source();
    let mut repo = SiteRepo::default();

    if let Some(spider) = mix_spider(config, sourcer).await? {
        repo.spider = spider;
    }
    if let Some((wallpaper, _)) = mix_optional_scalar(&opt.wallpaper, fallback, sourcer).await? {
        repo.wallpaper = wallpaper;
    }
    if let Some((logo, _)) = mix_optional_scalar(&opt.logo, fallback, sourcer).await? {
        repo.logo = logo;
    }

    repo.sites = mix_arrays(&opt.sites, fallback, sourcer).await?;
    repo.doh = mix_arrays(&opt.doh, fallback, sourcer).await?;
    repo.lives = mix_arrays(&opt.lives, fallback, sourcer).await?;
    repo.parses = mix_arrays(&opt.parses, fallback, sourcer).await?;
    repo.flags = mix_arrays(&opt.flags, fallback, sourcer).await?;
    repo.rules = mix_arrays(&opt.rules, fallback, sourcer).await?;
    repo.ads = mix_arrays(&opt.ads, fallback, sourcer).await?;

    debug!(
        "Merged site repo: {} sites, {} lives, {} parses",
        repo.sites.len(),
        repo.lives.len(),
        repo.parses.len()
    );
    Ok(repo)
}

pub async fn mix_multi_repo<S>(config: &Config, sourcer: &S) -> Result<MultiRepo>
where
    S: Sourcer + ?Sized,
{
    let opt = &config.tvbox_multi_repo_opt;
    let mut multi = MultiRepo::default();

    if opt.include_single_repo {
        multi.repos.push(RepoUrl {
            url: format!("{}{}", config.external_url(), SELF_REPO_PATH),
            name: SELF_REPO_NAME.to_string(),
        });
    }
    multi.repos.extend(mix_arrays::<RepoUrl, S>(&opt.repos, "", sourcer).await?);

    Ok(multi)
}
