//! Plain text rendering of the session state.

use {
    crate::{
        admins::AdminScan,
        session::{Holdings, SessionState, TokenPair},
    },
    number::units::format_token_amount,
    std::fmt::Write,
};

/// Part of the state a command is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Balances,
    Quote,
    Registry,
    Admins,
}

pub fn render(state: &SessionState, section: Section) -> String {
    let mut out = String::new();
    // Writing to a `String` cannot fail.
    let _ = match section {
        Section::Balances => balances(&mut out, state),
        Section::Quote => quote(&mut out, state),
        Section::Registry => registry(&mut out, state),
        Section::Admins => admins(&mut out, state),
    };
    out
}

fn holdings(
    out: &mut String,
    name: &str,
    holdings: &Holdings,
    tokens: &TokenPair,
) -> std::fmt::Result {
    writeln!(
        out,
        "{name}: {} {}, {} {}",
        format_token_amount(holdings.quote, tokens.quote.decimals),
        tokens.quote.symbol,
        format_token_amount(holdings.base, tokens.base.decimals),
        tokens.base.symbol,
    )
}

fn balances(out: &mut String, state: &SessionState) -> std::fmt::Result {
    let (Some(tokens), Some(balances)) = (&state.tokens, &state.balances) else {
        return writeln!(out, "balances not loaded");
    };
    match &balances.wallet {
        Some(wallet) => holdings(out, "wallet", wallet, tokens)?,
        None => writeln!(out, "wallet: not connected")?,
    }
    if let Some(treasury) = &balances.treasury {
        holdings(out, "treasury", treasury, tokens)?;
    }
    if let Some(pool) = &state.pool {
        let reserves = pool.reserves;
        holdings(
            out,
            "pool",
            &Holdings {
                quote: reserves.quote,
                base: reserves.base,
            },
            tokens,
        )?;
        writeln!(out, "pool fee: {}", pool.fee)?;
    }
    Ok(())
}

fn quote(out: &mut String, state: &SessionState) -> std::fmt::Result {
    let (Some(quote), Some(tokens)) = (&state.quote, &state.tokens) else {
        return writeln!(out, "no quote");
    };
    let (token_in, token_out) = (
        tokens.input(quote.direction),
        tokens.output(quote.direction),
    );
    writeln!(
        out,
        "sell: {} {}",
        format_token_amount(quote.amount_in, token_in.decimals),
        token_in.symbol
    )?;
    writeln!(
        out,
        "receive: {} {}",
        format_token_amount(quote.amount_out, token_out.decimals),
        token_out.symbol
    )?;
    writeln!(
        out,
        "minimum received: {} {}",
        format_token_amount(quote.min_amount_out, token_out.decimals),
        token_out.symbol
    )?;
    let impact = quote.price_impact_bps();
    writeln!(out, "price impact: {}.{:02}%", impact / 100, impact % 100)
}

fn registry(out: &mut String, state: &SessionState) -> std::fmt::Result {
    if state.registry_entries.is_empty() {
        return writeln!(out, "no registry entries");
    }
    for entry in &state.registry_entries {
        write!(
            out,
            "{} = {} ({}, permission {}",
            entry.id,
            entry.value,
            entry.value.value_type(),
            entry.permission
        )?;
        if entry.immutable {
            out.push_str(", immutable");
        }
        out.push_str(")\n");
    }
    Ok(())
}

fn admins(out: &mut String, state: &SessionState) -> std::fmt::Result {
    let Some(scan) = &state.admins else {
        return writeln!(out, "admins not loaded");
    };
    match scan {
        AdminScan::Complete { range, .. } => writeln!(out, "admins in blocks {range}:")?,
        AdminScan::Partial { range, reason, .. } => {
            writeln!(out, "admins in blocks {range} (incomplete, {reason}):")?
        }
        AdminScan::Undetermined { reason } => {
            return writeln!(out, "admins unknown: {reason}");
        }
    }
    if let Some(admins) = scan.admins() {
        if admins.is_empty() {
            writeln!(out, "  none")?;
        }
        for admin in admins {
            writeln!(out, "  {admin}")?;
        }
    }
    if let AdminScan::Complete { skipped_blocks, .. } | AdminScan::Partial { skipped_blocks, .. } =
        scan
    {
        if !skipped_blocks.is_empty() {
            writeln!(out, "blocks that could not be scanned: {skipped_blocks:?}")?;
        }
    }
    Ok(())
}
