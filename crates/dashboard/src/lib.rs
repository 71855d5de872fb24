pub mod admins;
pub mod arguments;
pub mod error;
pub mod onchain;
pub mod quote;
pub mod registry;
pub mod session;
pub mod traits;
pub mod view;

use {
    crate::{
        admins::cancellation::{CancellationTrigger, cancellation},
        arguments::{Arguments, Command, RegistryCommand},
        onchain::Onchain,
        quote::SwapDirection,
        session::{Clients, Message, Session, SessionState, Status},
        view::Section,
    },
    anyhow::{Context, Result},
    clap::Parser,
    std::process::ExitCode,
};

/// Parses arguments, sets up logging and runs the requested command.
pub async fn start(args: impl Iterator<Item = String>) -> ExitCode {
    let args = Arguments::parse_from(args);
    let obs_config = observe::Config::new(
        args.logging.log_filter.as_str(),
        args.logging.log_stderr_threshold.into_level(),
        args.logging.use_json_logs,
    );
    observe::tracing::initialize(&obs_config);
    tracing::info!("running dashboard with validated arguments:\n{}", args);

    match run(args).await {
        Ok(status) if status.is_ok() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(?err, "failed to start dashboard");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Runs one command against a fresh session and prints the result. Returns
/// the status of the last handled message.
pub async fn run(args: Arguments) -> Result<Status> {
    let (provider, account) = match &args.private_key {
        Some(private_key) => {
            let signer = ethrpc::alloy::parse_signer(private_key)
                .context("--private-key is not a valid private key")?;
            let (provider, account) =
                ethrpc::alloy::provider_with_signer(&args.node_url, "dashboard", signer);
            (provider, Some(account))
        }
        None => (ethrpc::alloy::provider(&args.node_url, "dashboard"), None),
    };
    if let Some(account) = account {
        tracing::info!(%account, "connected wallet");
    }

    let (trigger, cancel) = cancellation();
    let ctrl_c = tokio::spawn(cancel_on_ctrl_c(trigger));
    let mut session = Session::new(
        Clients::onchain(Onchain::new(provider)),
        args.addresses(),
        account,
        args.admin_scan.config(),
        cancel,
    );

    let (messages, section) = messages(args.command);
    let mut status = Status::Ok("nothing to do".to_string());
    for message in messages {
        status = session.handle(message).await;
        if !status.is_ok() {
            break;
        }
    }
    ctrl_c.abort();

    if let Some(section) = section_to_render(section, &status, session.state()) {
        print!("{}", view::render(session.state(), section));
    }
    println!("{status}");
    Ok(status)
}

/// Translates a command into the session messages that carry it out and the
/// part of the state to show afterwards.
fn messages(command: Command) -> (Vec<Message>, Option<Section>) {
    let direction_toggle = |direction: SwapDirection| {
        (direction != SwapDirection::default()).then_some(Message::ToggleDirection)
    };
    match command {
        Command::Balances => (vec![Message::Refresh], Some(Section::Balances)),
        Command::Quote { amount, direction } => (
            direction_toggle(direction)
                .into_iter()
                .chain([Message::SetAmount(amount)])
                .collect(),
            Some(Section::Quote),
        ),
        Command::Swap { amount, direction } => (
            direction_toggle(direction)
                .into_iter()
                .chain([Message::SetAmount(amount), Message::ExecuteSwap])
                .collect(),
            Some(Section::Balances),
        ),
        Command::Registry(RegistryCommand::List { ids }) => {
            (vec![Message::LoadRegistry(ids)], Some(Section::Registry))
        }
        Command::Registry(RegistryCommand::Set {
            id,
            value_type,
            value,
            permission,
        }) => (
            vec![Message::WriteEntry {
                id,
                value_type,
                value,
                permission,
            }],
            Some(Section::Registry),
        ),
        Command::AssignModule { name, module } => (
            vec![Message::AssignModule { name, module }],
            Some(Section::Registry),
        ),
        Command::Mint { asset, amount, to } => (
            vec![Message::Mint { asset, to, amount }],
            Some(Section::Balances),
        ),
        Command::Admins => (vec![Message::LoadAdmins], Some(Section::Admins)),
    }
}

/// Failed commands only print their status, except for an admin scan whose
/// stored outcome says why the set is unknown.
fn section_to_render(
    section: Option<Section>,
    status: &Status,
    state: &SessionState,
) -> Option<Section> {
    section.filter(|section| {
        status.is_ok() || (*section == Section::Admins && state.admins.is_some())
    })
}

/// Stops running scans on the first ctrl-c. They return what they collected
/// so far.
async fn cancel_on_ctrl_c(trigger: CancellationTrigger) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("received ctrl-c, cancelling");
            trigger.cancel();
        }
        Err(err) => tracing::warn!(?err, "failed to listen for ctrl-c"),
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{admins::AdminScan, registry::ValueType, session::Asset},
    };

    #[test]
    fn undetermined_admins_are_rendered_despite_failure() {
        let failed = Status::Failed("admin set could not be determined: timeout".into());
        let state = SessionState {
            admins: Some(AdminScan::Undetermined {
                reason: "timeout".into(),
            }),
            ..Default::default()
        };
        assert_eq!(
            section_to_render(Some(Section::Admins), &failed, &state),
            Some(Section::Admins)
        );
        assert!(view::render(&state, Section::Admins).starts_with("admins unknown: timeout"));

        assert_eq!(
            section_to_render(Some(Section::Balances), &failed, &state),
            None
        );
        assert_eq!(
            section_to_render(Some(Section::Admins), &failed, &SessionState::default()),
            None
        );
    }

    #[test]
    fn quote_in_default_direction_does_not_toggle() {
        let (planned, section) = messages(Command::Quote {
            amount: "1".into(),
            direction: SwapDirection::QuoteToBase,
        });
        assert_eq!(planned, vec![Message::SetAmount("1".into())]);
        assert_eq!(section, Some(Section::Quote));
    }

    #[test]
    fn reverse_swap_toggles_before_quoting() {
        let (planned, _) = messages(Command::Swap {
            amount: "2".into(),
            direction: SwapDirection::BaseToQuote,
        });
        assert_eq!(
            planned,
            vec![
                Message::ToggleDirection,
                Message::SetAmount("2".into()),
                Message::ExecuteSwap,
            ]
        );
    }

    #[test]
    fn admin_commands_map_to_single_messages() {
        let (planned, _) = messages(Command::Registry(RegistryCommand::Set {
            id: "fee.bps".into(),
            value_type: ValueType::UInt256,
            value: "30".into(),
            permission: None,
        }));
        assert!(matches!(planned.as_slice(), [Message::WriteEntry { .. }]));

        let (planned, section) = messages(Command::Mint {
            asset: Asset::Quote,
            amount: "5".into(),
            to: None,
        });
        assert!(matches!(
            planned.as_slice(),
            [Message::Mint {
                asset: Asset::Quote,
                to: None,
                ..
            }]
        ));
        assert_eq!(section, Some(Section::Balances));
    }
}
