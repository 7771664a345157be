use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pledge_core::app::{
    AppBuilder, ContributorPledgeView, ContributorView, ErrorBody, ListPledgesParams, PledgeApi,
    PledgeRequest, PledgeView, TaskFundingView,
};
use pledge_core::config::LedgerConfig;
use pledge_core::domain::{Profile, SortBy, SortOrder, TaskId, UserId};
use pledge_core::impls::{InMemoryLedger, InMemoryProfileDirectory};

/// In-memory pledge ledger demo
#[derive(Debug, Parser)]
#[command(name = "pledge-demo", version, about)]
struct Cli {
    /// Configuration file (toml / yaml / json, extension optional)
    #[arg(long, env = "PLEDGE_CONFIG")]
    config: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    json: bool,

    /// Log filter used when RUST_LOG is unset (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    /// Concurrent pledges in the burst phase
    #[arg(long, default_value_t = 20)]
    burst: u32,
}

fn init_tracing(config: &LedgerConfig, cli: &Cli) {
    let filter = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.filter.clone());
    let json = cli.json || config.logging.json;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer().without_time()))
        .init();
}

fn print<T: Serialize>(label: &str, value: &T) -> anyhow::Result<()> {
    println!("== {label}");
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn show_funding(api: &PledgeApi, task_id: TaskId) -> anyhow::Result<()> {
    let funding = api.task_funding(task_id).await?;
    print("funding", &TaskFundingView::from(&funding))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = LedgerConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(&config, &cli);

    let ledger = InMemoryLedger::new();
    let profiles = InMemoryProfileDirectory::new();
    profiles
        .put(
            Profile::new(UserId::parse("user1").context("user id")?, "Ada")
                .with_avatar("https://avatars.example/ada.png"),
        )
        .await;
    profiles
        .put(Profile::new(UserId::parse("user2").context("user id")?, "Grace"))
        .await;

    let api = AppBuilder::new()
        .in_memory_ledger(ledger.clone())
        .profile_directory(Arc::new(profiles))
        .with_config(&config)
        .build()?;

    // 1) goal 200 の task に user1 → user2 → user1（更新）の順で pledge
    let task = api.register_task(Decimal::from(200)).await?;
    tracing::info!(task_id = %task.id, "demo task created");

    for (user, amount) in [("user1", 50), ("user2", 75), ("user1", 100)] {
        let pledge = api
            .create_or_update_pledge(Some(user), &PledgeRequest::new(task.id, amount))
            .await?;
        print(&format!("pledge by {user}"), &PledgeView::from(&pledge))?;
        show_funding(&api, task.id).await?;
    }

    // 2) user3 を足して amount desc / limit 2 で一覧
    api.create_or_update_pledge(Some("user3"), &PledgeRequest::new(task.id, "30"))
        .await?;
    let params = ListPledgesParams::for_task(task.id)
        .sorted(SortBy::Amount, SortOrder::Desc)
        .limit(2);
    let rows = api.list_pledges_for_task(&params).await?;
    let rows: Vec<ContributorPledgeView> = rows.iter().map(ContributorPledgeView::from).collect();
    print("pledges (amount desc, limit 2)", &rows)?;

    let top = api.top_contributors(task.id, None).await?;
    let top: Vec<ContributorView> = top.iter().map(ContributorView::from).collect();
    print("top contributors", &top)?;

    // 3) 不正な入力は構造化エラーになる
    for (caller, request) in [
        (Some("user4"), PledgeRequest::new(task.id, 0)),
        (None, PledgeRequest::new(task.id, 10)),
    ] {
        if let Err(err) = api.create_or_update_pledge(caller, &request).await {
            print("rejected", &ErrorBody::from(&err))?;
        }
    }

    // 4) 別 task への同時 pledge（同じ user が混ざっても 1 行に収束する）
    let burst_task = api.register_task(Decimal::from(1000)).await?.id;
    let mut handles = Vec::new();
    for i in 0..cli.burst {
        let api = api.clone();
        let user = format!("burst-{}", i % 5);
        handles.push(tokio::spawn(async move {
            api.create_or_update_pledge(Some(&user), &PledgeRequest::new(burst_task, i + 1))
                .await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let fundings = api.list_task_fundings().await?;
    let fundings: Vec<TaskFundingView> = fundings.iter().map(TaskFundingView::from).collect();
    print("all tasks", &fundings)?;

    tracing::info!(
        pledge_rows = ledger.pledge_count().await,
        deferred = api.deferred_resyncs().await.len(),
        "demo finished"
    );
    Ok(())
}
