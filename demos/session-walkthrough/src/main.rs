//! Session gate walkthrough
//!
//! Runs the session gate against the in-memory identity provider and prints
//! what a UI bound to the gate would see at each step.

use anyhow::{Context, bail};
use sakshatkar_auth::mocks::MockIdentityProvider;
use sakshatkar_auth::{AuthEventKind, GateConfig, GateState, SessionGate};
use sakshatkar_core::environment::SystemClock;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Gate = SessionGate<MockIdentityProvider, SystemClock>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "session_walkthrough=info,sakshatkar_auth=debug,sakshatkar_runtime=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GateConfig::from_env()
        .context("reading SAKSHATKAR_* configuration")?
        .with_admin_email("admin@sakshatkar.dev");
    tracing::info!(
        login = %config.login_path,
        landing = %config.landing_path,
        "Gate configuration loaded"
    );

    println!("=== Sakshatkar session gate walkthrough ===");

    protected_page_round_trip(&config).await?;
    returning_user(&config).await?;
    refresh_failure(&config).await?;
    admin_page(&config).await?;

    println!("\n=== Walkthrough complete ===");
    Ok(())
}

/// Signed-out visit to /dashboard, sign in, land back on /dashboard.
async fn protected_page_round_trip(config: &GateConfig) -> anyhow::Result<()> {
    println!("\n>>> Opening /dashboard without a session");
    let provider = MockIdentityProvider::new();
    let gate = SessionGate::new(config.clone(), provider.clone(), SystemClock, "/dashboard");

    gate.start().await?;
    gate.settled().await;
    show(&gate);

    println!("\n>>> User signs in on the login page");
    let listeners = provider.emit(
        AuthEventKind::SignedIn,
        Some(MockIdentityProvider::session_for("learner@example.com")),
    );
    tracing::debug!(listeners, "SignedIn delivered");
    wait_until(&gate, GateState::is_signed_in).await?;
    show(&gate);

    println!("\n>>> User signs out");
    gate.logout().await?;
    wait_until(&gate, |s| !s.is_signed_in() && !s.sign_out_pending).await?;
    show(&gate);

    gate.dispose();
    Ok(())
}

/// Valid session at startup: no redirect.
async fn returning_user(config: &GateConfig) -> anyhow::Result<()> {
    println!("\n>>> Opening /self-practice with a stored session");
    let provider =
        MockIdentityProvider::new().with_session(MockIdentityProvider::session_for("learner@example.com"));
    let gate = SessionGate::new(config.clone(), provider, SystemClock, "/self-practice");

    gate.start().await?;
    gate.settled().await;
    show(&gate);

    if gate.state(|s| s.redirects) != 0 {
        bail!("returning user was redirected");
    }
    gate.dispose();
    Ok(())
}

/// Token refresh without a session: session-expired notice and back to login.
async fn refresh_failure(config: &GateConfig) -> anyhow::Result<()> {
    println!("\n>>> Refresh token revoked while on /peer-practice");
    let provider =
        MockIdentityProvider::new().with_session(MockIdentityProvider::session_for("learner@example.com"));
    let gate = SessionGate::new(config.clone(), provider.clone(), SystemClock, "/peer-practice");

    gate.start().await?;
    gate.settled().await;

    let _ = provider.emit(AuthEventKind::TokenRefreshed, None);
    wait_until(&gate, |s| !s.notices.is_empty()).await?;
    show(&gate);

    gate.dispose();
    Ok(())
}

/// Non-admin user opening the admin page is sent home.
async fn admin_page(config: &GateConfig) -> anyhow::Result<()> {
    println!("\n>>> Non-admin opens /admin/hackathon");
    let provider =
        MockIdentityProvider::new().with_session(MockIdentityProvider::session_for("learner@example.com"));
    let gate = SessionGate::new(config.clone(), provider, SystemClock, "/dashboard");

    gate.start().await?;
    gate.settled().await;

    let decision = gate.enter("/admin/hackathon").await?;
    println!("Guard decision: {decision:?}");
    show(&gate);

    gate.dispose();
    Ok(())
}

async fn wait_until<F>(gate: &Gate, mut pred: F) -> anyhow::Result<()>
where
    F: FnMut(&GateState) -> bool,
{
    let mut snapshots = gate.subscribe();
    tokio::time::timeout(Duration::from_secs(5), snapshots.wait_for(|s| pred(s)))
        .await
        .context("timed out waiting for the gate")?
        .map(|_| ())
        .context("gate store closed")?;
    gate.settled().await;
    Ok(())
}

fn show(gate: &Gate) {
    let state = gate.view();
    let user = state.user.as_ref().map_or("-", |u| u.email.as_str());
    let intent = state.intent.as_ref().map_or("-", |i| i.path.as_str());

    println!("  user:      {user}");
    println!("  phase:     {:?}", state.phase);
    println!("  location:  {}", state.location);
    println!("  intent:    {intent}");
    println!("  redirects: {}", state.redirects);
    for notice in &state.notices {
        println!("  notice:    {} - {}", notice.title, notice.description);
    }
}
