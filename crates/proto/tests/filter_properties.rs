//! Property tests for the filter's quantified invariants and the policy
//! store's approval algebra.

use proptest::prelude::*;
use std::sync::Arc;
use warden_proto::policy::{PolicyStore, Scope};
use warden_proto::prompt::PromptFn;
use warden_proto::ssh::connection::{
    ChannelFailure, ChannelOpen, ChannelRequest, ChannelRequestType, ChannelType, GlobalRequest,
    RequestFailure, RequestSuccess,
};
use warden_proto::ssh::filter::{ClientVerdict, Filter, NmsStatus};

fn test_scope() -> Scope {
    Scope {
        client_username: "alice".to_string(),
        client_hostname: "laptop".to_string(),
        client_port: 22000,
        service_username: "bob".to_string(),
        service_hostname: "srv".to_string(),
    }
}

fn rejecting_prompt() -> PromptFn {
    Arc::new(|_| Ok(1))
}

fn filter_expecting(command: &str) -> Filter {
    Filter::new(
        test_scope(),
        Arc::new(PolicyStore::in_memory()),
        command,
        rejecting_prompt(),
    )
}

fn open_session(sender_channel: u32) -> Vec<u8> {
    ChannelOpen::new(ChannelType::Session, sender_channel, 1048576, 32768).to_bytes()
}

fn exec_request(channel: u32, command: &str) -> Vec<u8> {
    ChannelRequest::new(
        channel,
        ChannelRequestType::Exec {
            command: command.to_string(),
        },
        true,
    )
    .to_bytes()
}

/// One observable NMS event, as the filter sees it.
#[derive(Debug, Clone, Copy)]
enum NmsEvent {
    ClientRequest,
    ServerSuccess,
    ServerFailure,
    ServerOther,
}

fn nms_event() -> impl Strategy<Value = NmsEvent> {
    prop_oneof![
        Just(NmsEvent::ClientRequest),
        Just(NmsEvent::ServerSuccess),
        Just(NmsEvent::ServerFailure),
        Just(NmsEvent::ServerOther),
    ]
}

proptest! {
    /// Invariant 1: at most one session channel is ever opened; the first
    /// open passes and every subsequent one is blocked.
    #[test]
    fn at_most_one_session_channel(opens in 1usize..8) {
        let filter = filter_expecting("ls");

        for i in 0..opens {
            let verdict = filter.filter_client_packet(&open_session(i as u32)).unwrap();
            if i == 0 {
                prop_assert_eq!(verdict, ClientVerdict::Forward);
            } else {
                prop_assert!(matches!(verdict, ClientVerdict::Block { .. }), "expected Block");
            }
        }

        prop_assert!(filter.session_opened());
    }

    /// Invariant 2: a channel request passes iff it is an exec with exactly
    /// the expected command; everything else is answered with a
    /// channel_request_failure echoing the channel the request arrived on.
    #[test]
    fn exec_passes_iff_command_matches(
        expected in "[ -~]{1,40}",
        got in "[ -~]{1,40}",
        channel in 0u32..1024,
    ) {
        let filter = filter_expecting(&expected);

        let verdict = filter
            .filter_client_packet(&exec_request(channel, &got))
            .unwrap();
        if got == expected {
            prop_assert_eq!(verdict, ClientVerdict::Forward);
        } else {
            match verdict {
                ClientVerdict::Block { response } => {
                    let failure = ChannelFailure::from_bytes(&response).unwrap();
                    prop_assert_eq!(failure.recipient_channel(), channel);
                }
                other => prop_assert!(false, "expected Block, got {:?}", other),
            }
        }
    }

    /// Non-exec channel requests are always blocked, whatever their name.
    #[test]
    fn non_exec_requests_always_blocked(
        name in "[a-z][a-z0-9-]{0,20}",
        channel in 0u32..1024,
    ) {
        prop_assume!(name != "exec");
        let filter = filter_expecting("ls");

        let request = ChannelRequest::new(
            channel,
            ChannelRequestType::Other { name, data: Vec::new() },
            true,
        );
        let verdict = filter.filter_client_packet(&request.to_bytes()).unwrap();
        match verdict {
            ClientVerdict::Block { response } => {
                let failure = ChannelFailure::from_bytes(&response).unwrap();
                prop_assert_eq!(failure.recipient_channel(), channel);
            }
            other => prop_assert!(false, "expected Block, got {:?}", other),
        }
    }

    /// Invariant 3: `nms_status` follows the DAG
    /// Inactive → AwaitingReply → {Success, Failure}, whatever the event
    /// order on the wire.
    #[test]
    fn nms_transitions_form_a_dag(events in proptest::collection::vec(nms_event(), 0..24)) {
        let filter = filter_expecting("ls");
        let mut model = NmsStatus::Inactive;

        for event in events {
            match event {
                NmsEvent::ClientRequest => {
                    filter
                        .filter_client_packet(&GlobalRequest::no_more_sessions().to_bytes())
                        .unwrap();
                    if model == NmsStatus::Inactive {
                        model = NmsStatus::AwaitingReply;
                    }
                }
                NmsEvent::ServerSuccess => {
                    filter
                        .filter_server_packet(&RequestSuccess::new().to_bytes())
                        .unwrap();
                    if model == NmsStatus::AwaitingReply {
                        model = NmsStatus::Success;
                    }
                }
                NmsEvent::ServerFailure => {
                    filter
                        .filter_server_packet(&RequestFailure::new().to_bytes())
                        .unwrap();
                    if model == NmsStatus::AwaitingReply {
                        model = NmsStatus::Failure;
                    }
                }
                NmsEvent::ServerOther => {
                    filter
                        .filter_server_packet(&[94, 0, 0, 0, 0])
                        .unwrap();
                }
            }

            prop_assert_eq!(filter.nms_status(), model);
        }
    }

    /// Messages outside the inspected set pass the client filter untouched.
    #[test]
    fn uninspected_messages_pass(
        msg_num in any::<u8>().prop_filter(
            "not an inspected message number",
            |b| ![20u8, 80, 90, 98].contains(b),
        ),
        body in proptest::collection::vec(any::<u8>(), 0..32),
    ) {
        let filter = filter_expecting("ls");

        let mut packet = vec![msg_num];
        packet.extend(body);

        let verdict = filter.filter_client_packet(&packet).unwrap();
        prop_assert_eq!(verdict, ClientVerdict::Forward);
    }

    /// Invariant 6: the store mutators are idempotent and imply approval.
    #[test]
    fn store_mutators_are_idempotent(
        command in "[ -~]{1,40}",
        other in "[ -~]{1,40}",
        port in 1u16..=65535,
    ) {
        let scope = Scope { client_port: port, ..test_scope() };
        let store = PolicyStore::in_memory();

        store.set_command_allowed(&scope, &command).unwrap();
        let once = store.get_rule(&scope);
        store.set_command_allowed(&scope, &command).unwrap();
        prop_assert_eq!(store.get_rule(&scope), once.clone());

        prop_assert!(once.is_approved(&command));
        if other != command {
            prop_assert!(!once.is_approved(&other));
        }

        store.set_all_allowed(&scope).unwrap();
        let all = store.get_rule(&scope);
        store.set_all_allowed(&scope).unwrap();
        prop_assert_eq!(store.get_rule(&scope), all.clone());

        prop_assert!(all.is_approved(&command));
        prop_assert!(all.is_approved(&other));
    }
}
