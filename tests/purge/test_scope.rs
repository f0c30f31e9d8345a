//! Scope resolution

use std::sync::Arc;
use std::time::Duration;

use discord_purge::{Configuration, ConfigurationBuilder, Error, HttpOutcome, Job, ScopeResolver};

use crate::common::{dm, guild, Call, FakeApi};

fn builder() -> ConfigurationBuilder {
    Configuration::builder("token")
}

async fn resolve(api: &Arc<FakeApi>, config: Configuration) -> discord_purge::Result<Vec<Job>> {
    ScopeResolver::new(api.clone(), Arc::new(config)).resolve().await
}

fn listing_api() -> Arc<FakeApi> {
    Arc::new(
        FakeApi::new()
            .with_guilds(vec![
                guild("1", false),
                guild("2", true),
                guild("3", false),
                guild("4", false),
            ])
            .with_dms(vec![dm("10"), dm("11")]),
    )
}

#[tokio::test]
async fn test_no_guilds_sweeps_everything_visible() {
    let api = listing_api();
    let config = builder().ignore_guild("3").ignore_dm("11").build().unwrap();

    let jobs = resolve(&api, config).await.unwrap();

    assert_eq!(
        jobs,
        vec![Job::guild("1"), Job::guild("4"), Job::dm("10")]
    );
}

#[tokio::test]
async fn test_no_guilds_without_dms() {
    let api = listing_api();
    let config = builder().include_dms(false).build().unwrap();

    let jobs = resolve(&api, config).await.unwrap();

    assert_eq!(jobs, vec![Job::guild("1"), Job::guild("3"), Job::guild("4")]);
    assert!(!api.calls().contains(&Call::ListDms));
}

#[tokio::test]
async fn test_two_guilds_give_two_jobs_in_order() {
    let api = listing_api();
    let config = builder().guild_ids(["77", "55"]).build().unwrap();

    let jobs = resolve(&api, config).await.unwrap();

    assert_eq!(jobs, vec![Job::guild("77"), Job::guild("55")]);
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_dm_namespace_among_guilds_expands_in_place() {
    let api = listing_api();
    let config = builder()
        .guild_ids(["77", "@me", "55"])
        .ignore_guild("55")
        .build()
        .unwrap();

    let jobs = resolve(&api, config).await.unwrap();

    assert_eq!(
        jobs,
        vec![Job::guild("77"), Job::dm("10"), Job::dm("11")]
    );
}

#[tokio::test]
async fn test_dm_namespace_alone_fetches_channels() {
    let api = listing_api();
    let config = builder().guild_id("@me").ignore_dm("10").build().unwrap();

    let jobs = resolve(&api, config).await.unwrap();

    assert_eq!(jobs, vec![Job::dm("11")]);
}

#[tokio::test]
async fn test_dm_namespace_with_channels_skips_fetch() {
    let api = listing_api();
    let config = builder()
        .guild_id("@me")
        .channel_ids(["10", "99"])
        .build()
        .unwrap();

    let jobs = resolve(&api, config).await.unwrap();

    assert_eq!(jobs, vec![Job::dm("10"), Job::dm("99")]);
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_single_guild_with_and_without_channels() {
    let api = listing_api();

    let with_channels = builder()
        .guild_id("123")
        .channel_id("456")
        .channel_id("789")
        .build()
        .unwrap();
    assert_eq!(
        resolve(&api, with_channels).await.unwrap(),
        vec![Job::channel("123", "456"), Job::channel("123", "789")]
    );

    let guild_wide = builder().guild_id("123").build().unwrap();
    assert_eq!(
        resolve(&api, guild_wide).await.unwrap(),
        vec![Job::guild("123")]
    );
}

#[tokio::test]
async fn test_dm_channels_keep_names_and_drop_ignored() {
    let api = listing_api();
    let config = builder().ignore_dm("10").build().unwrap();

    let channels = ScopeResolver::new(api.clone(), Arc::new(config))
        .dm_channels()
        .await
        .unwrap();

    assert_eq!(channels, vec![dm("11")]);
    assert_eq!(channels[0].name, "dm 11");
}

#[test]
fn test_channels_with_several_guilds_are_rejected() {
    let result = builder()
        .guild_ids(["1", "2"])
        .channel_id("456")
        .build();
    assert!(matches!(result, Err(Error::ConfigError(_))));

    let result = builder().channel_id("456").build();
    assert!(matches!(result, Err(Error::ConfigError(_))));
}

#[tokio::test(start_paused = true)]
async fn test_listing_retries_rate_limits() {
    let api = Arc::new(
        FakeApi::new()
            .with_guilds(vec![guild("1", false)])
            .script_guilds(HttpOutcome::RateLimited {
                retry_after: Duration::from_secs(3),
            })
            .script_guilds(HttpOutcome::ServerError { status: 502 }),
    );
    let config = builder()
        .include_dms(false)
        .max_attempts(2)
        .build()
        .unwrap();

    let jobs = resolve(&api, config).await.unwrap();

    assert_eq!(jobs, vec![Job::guild("1")]);
    let listings = api
        .calls()
        .into_iter()
        .filter(|c| *c == Call::ListGuilds)
        .count();
    assert_eq!(listings, 3);
}

#[tokio::test]
async fn test_listing_unauthorized_is_auth_error() {
    let api = Arc::new(FakeApi::new().script_guilds(HttpOutcome::ClientError {
        status: 401,
        code: Some(0),
        message: "401: Unauthorized".into(),
    }));

    let err = resolve(&api, builder().build().unwrap()).await.unwrap_err();
    assert!(err.is_auth());
}
