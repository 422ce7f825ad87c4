//! CLI commands

use chrono::Utc;

use tontine_core::{ActionKind, Principal, Reason, ResourceRef};
use tontine_validation::{RequestStatus, ValidationRequest};

use crate::context::AppContext;

/// Register a resource in the local directory
pub async fn resource_add(
    ctx: &AppContext,
    resource: &ResourceRef,
    label: &str,
    contact: Option<&str>,
) -> Result<(), anyhow::Error> {
    let mut snapshot = tontine_validation::ResourceSnapshot::new(label);
    if let Some(contact) = contact {
        snapshot = snapshot.with_contact(contact);
    }
    ctx.directory.add(resource, snapshot)?;
    println!("✅ Registered {} as \"{}\"", resource, label);
    Ok(())
}

/// List the resources the directory knows
pub async fn resource_list(ctx: &AppContext) -> Result<(), anyhow::Error> {
    let entries = ctx.directory.list();
    if entries.is_empty() {
        println!("No resources registered");
        return Ok(());
    }
    for (reference, snapshot) in entries {
        match snapshot.contact {
            Some(contact) => println!("{:<24} {} <{}>", reference, snapshot.label, contact),
            None => println!("{:<24} {}", reference, snapshot.label),
        }
    }
    Ok(())
}

/// Open a validation request
pub async fn request(
    ctx: &AppContext,
    action: ActionKind,
    resource_id: &str,
    initiator: Principal,
    approvers: Vec<Principal>,
    reason: &str,
) -> Result<(), anyhow::Error> {
    let reason = Reason::new(reason)?;
    let req = ctx
        .workflow
        .create(action, resource_id, initiator, approvers, reason)
        .await?;

    println!(
        "✅ Opened {} for {} on {} (expires {})",
        req.id,
        req.action,
        req.resource,
        req.expires_at.format("%Y-%m-%d %H:%M UTC")
    );
    println!(
        "   Awaiting code from {} (stage 1 of {})",
        req.approvers[0].approver, req.approvers.len()
    );
    Ok(())
}

/// Submit a one-time code
pub async fn verify(
    ctx: &AppContext,
    request_id: &str,
    acting: Principal,
    code: &str,
) -> Result<(), anyhow::Error> {
    let req = ctx.workflow.verify_party(request_id, &acting, code).await?;
    match req.status {
        RequestStatus::Completed => {
            println!("✅ {} completed - the {} action is authorized", req.id, req.action);
        }
        RequestStatus::Stage1Verified => {
            println!(
                "✅ Stage 1 verified on {}; awaiting {}",
                req.id,
                req.terminal_approver()
            );
        }
        other => println!("✅ Verified; {} is now {}", req.id, other),
    }
    Ok(())
}

/// Reject a request (terminal approver only)
pub async fn reject(
    ctx: &AppContext,
    request_id: &str,
    acting: Principal,
    reason: &str,
) -> Result<(), anyhow::Error> {
    let reason = Reason::new(reason)?;
    let req = ctx.workflow.reject(request_id, &acting, reason).await?;
    println!("⛔ {} rejected by {}", req.id, acting.id);
    Ok(())
}

/// Re-issue the caller's active code
pub async fn resend(
    ctx: &AppContext,
    request_id: &str,
    acting: Principal,
) -> Result<(), anyhow::Error> {
    let req = ctx.workflow.resend(request_id, &acting).await?;
    println!("✅ Fresh code issued for {} on {}", acting.id, req.id);
    Ok(())
}

/// Expire timed-out requests (the scheduler's entry point)
pub async fn sweep(ctx: &AppContext) -> Result<(), anyhow::Error> {
    let swept = ctx.workflow.expire_sweep(Utc::now()).await?;
    if swept.is_empty() {
        println!("Nothing to expire");
    } else {
        println!("⌛ Expired {} request(s): {}", swept.len(), swept.join(", "));
    }
    Ok(())
}

/// The caller's action inbox
pub async fn pending(ctx: &AppContext, acting: Principal) -> Result<(), anyhow::Error> {
    let requests = ctx.workflow.pending_for(&acting)?;
    if requests.is_empty() {
        println!("No requests awaiting {}", acting.id);
        return Ok(());
    }
    for req in requests {
        println!(
            "{} {} on {} ({}) - opened by {} {}",
            req.id,
            req.action,
            req.resource,
            req.snapshot.label,
            req.initiator,
            req.created_at.format("%Y-%m-%d %H:%M UTC"),
        );
    }
    Ok(())
}

/// Show one request to an involved party
pub async fn show(
    ctx: &AppContext,
    request_id: &str,
    acting: Principal,
) -> Result<(), anyhow::Error> {
    let req = ctx.workflow.fetch(request_id, &acting)?;
    print_request(&req);
    Ok(())
}

/// Read the execution gate without claiming it
pub async fn authorize(ctx: &AppContext, request_id: &str) -> Result<(), anyhow::Error> {
    if ctx.workflow.check_authorized(request_id)? {
        println!("✅ {} is authorized and unconsumed", request_id);
    } else {
        println!("❌ {} does not authorize execution", request_id);
    }
    Ok(())
}

/// Claim the single authorization of a completed request
pub async fn consume(
    ctx: &AppContext,
    request_id: &str,
    actor: Principal,
) -> Result<(), anyhow::Error> {
    let req = ctx.workflow.consume(request_id, &actor).await?;
    println!(
        "✅ {} consumed by {}; execute the {} action now",
        req.id, actor.id, req.action
    );
    Ok(())
}

/// Counts by status
pub async fn stats(ctx: &AppContext) -> Result<(), anyhow::Error> {
    let stats = ctx.workflow.stats()?;
    println!("pending:         {}", stats.pending);
    println!("stage1_verified: {}", stats.stage1_verified);
    println!("completed:       {}", stats.completed);
    println!("rejected:        {}", stats.rejected);
    println!("expired:         {}", stats.expired);
    Ok(())
}

/// Housekeeping: drop terminal requests from the store
pub async fn purge(ctx: &AppContext) -> Result<(), anyhow::Error> {
    let removed = ctx.store.purge_terminal()?;
    println!("🗑️  Purged {} terminal request(s)", removed);
    Ok(())
}

fn print_request(req: &ValidationRequest) {
    println!("{} - {}", req.id, req.status);
    println!("  action:    {} on {} ({})", req.action, req.resource, req.snapshot.label);
    println!("  initiator: {}", req.initiator);
    println!("  reason:    {}", req.reason);
    println!(
        "  opened:    {} (deadline {})",
        req.created_at.format("%Y-%m-%d %H:%M UTC"),
        req.expires_at.format("%Y-%m-%d %H:%M UTC"),
    );
    for (i, slot) in req.approvers.iter().enumerate() {
        let state = if slot.code.verified {
            "verified".to_string()
        } else if slot.code.is_armed() {
            format!("awaiting code ({} attempt(s) left)", slot.code.attempts_remaining())
        } else {
            "waiting for earlier stage".to_string()
        };
        println!("  stage {}:   {} - {}", i + 1, slot.approver, state);
    }
    if let Some(reason) = &req.rejection_reason {
        println!(
            "  rejected:  by {} - {}",
            req.rejected_by.as_deref().unwrap_or("?"),
            reason
        );
    }
    if let Some(at) = req.consumed_at {
        println!("  consumed:  {}", at.format("%Y-%m-%d %H:%M UTC"));
    }
}
