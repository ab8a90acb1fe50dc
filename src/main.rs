use cashdash::billing::cached_client::CachedBillingClient;
use cashdash::billing::types::{TransactionKind, UserId};
use cashdash::cache::AssetStatus;
use cashdash::config::Config;
use cashdash::ledger::LedgerView;
use cashdash::logging;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cashdash")]
#[command(about = "Subscription and cashback dashboard for a billing account")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/cashdash/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// User whose dashboard to show (overrides user_id from the config)
  #[arg(short, long)]
  user: Option<u64>,

  /// Ledger page to show
  #[arg(short, long, default_value_t = 1, allow_negative_numbers = true)]
  page: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.log)?;

  let user = args
    .user
    .map(UserId)
    .or(config.user_id)
    .ok_or_else(|| eyre!("No user selected. Pass --user or set user_id in the config file"))?;

  let client = CachedBillingClient::new(&config)?;
  client.switch_user(Some(user));

  let metrics = match client.dashboard_metrics(user).await {
    Err(e) if e.is_retryable() => {
      tracing::warn!(error = %e, "dashboard load failed, retrying once");
      client.dashboard_metrics(user).await?
    }
    result => result?,
  };
  println!("Dashboard for user {}", user);
  println!("  Subscriptions:     {}", metrics.total_subscriptions);
  println!("  Active:            {}", metrics.active_subscriptions);
  println!("  Expiring soon:     {}", metrics.expiring_soon);
  println!("  Monthly total:     {}", metrics.monthly_total);
  println!("  Cashback earned:   {}", metrics.total_cashback);
  println!("  Cashback balance:  {}", metrics.current_balance);

  let subscriptions = client.subscriptions(user).await?.into_data();
  if !subscriptions.is_empty() {
    let icons = futures::future::join_all(
      subscriptions
        .iter()
        .map(|subscription| client.resolve_icon(subscription).settle()),
    )
    .await;

    println!();
    println!("Subscriptions");
    for (subscription, icon) in subscriptions.iter().zip(icons) {
      let icon = match icon {
        AssetStatus::Ready(Some(_)) => "icon",
        AssetStatus::Ready(None) => "-",
        AssetStatus::Loading => "loading",
        AssetStatus::Error(_) => "broken icon",
      };
      println!(
        "  {:<24} {:<10} {:>10.2} / {:<9} paid until {:<10} [{}]",
        subscription.service_name.as_deref().unwrap_or("(unknown service)"),
        format!("{:?}", subscription.status),
        subscription.payment_amount,
        format!("{:?}", subscription.payment_period),
        subscription
          .paid_until
          .map(|date| date.to_string())
          .unwrap_or_else(|| "-".to_string()),
        icon,
      );
    }
  }

  let mut ledger = LedgerView::new(client.clone(), user, config.ledger.page_size);
  let page = ledger.goto(args.page).await?;

  println!();
  println!(
    "Cashback ledger (page {} of {}, {} transactions)",
    ledger.current_page(),
    ledger.total_pages(),
    page.total
  );
  for tx in &page.items {
    let sign = match tx.kind() {
      TransactionKind::Credit => '+',
      TransactionKind::Debit => '-',
    };
    println!(
      "  {}  {}{:>10.2}  {}",
      tx.created_at.format("%Y-%m-%d %H:%M"),
      sign,
      tx.amount.abs(),
      tx.description
    );
  }

  Ok(())
}
