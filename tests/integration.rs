#[cfg(test)]
mod integration_tests {
    use securechat_e2e::store::{
        IdentityKeyStore, MemoryIdentityKeyStore, MemorySessionStore,
    };
    use securechat_e2e::{
        AccountConfig, Conversations, Error, IdentityStore, KeyBundle, MessageContent,
        MessageEnvelope, Session, SessionConfig,
    };

    fn config() -> AccountConfig {
        AccountConfig {
            min_otpks: 2,
            max_otpks: 5,
            ..AccountConfig::default()
        }
    }

    fn text(envelope: &MessageEnvelope, session: &mut Session) -> String {
        let content = session.receive(envelope).unwrap();
        content.as_text().unwrap().to_string()
    }

    #[test]
    fn test_full_protocol_flow() {
        println!("Step 1: Creating identities for Alice and Bob...");
        let alice = IdentityStore::new("alice", config()).unwrap();
        let mut bob = IdentityStore::new("bob", config()).unwrap();

        println!("Step 2: Bob publishes his key bundle...");
        let published = bob.publish_bundle().unwrap().serialize();
        let bob_bundle = KeyBundle::deserialize(&published).unwrap();

        println!("Step 3: Verifying Bob's key bundle...");
        assert!(bob_bundle.verify().is_ok(), "Bundle verification failed");

        println!("Step 4: Alice creates outbound session to Bob...");
        let mut alice_session = alice.create_outbound_session("bob", &bob_bundle).unwrap();

        println!("Step 5: Alice sends three messages before Bob is online...");
        let messages: Vec<MessageEnvelope> = ["m1", "m2", "m3"]
            .iter()
            .map(|m| {
                alice_session
                    .send(alice.identity(), &MessageContent::text(*m), None)
                    .unwrap()
            })
            .collect();
        assert!(messages.iter().all(|m| m.initiation.is_some()));

        println!("Step 6: Bob creates inbound session from the initiation header...");
        let header = messages[2].initiation.unwrap();
        let mut bob_session = bob.create_inbound_session("alice", &header).unwrap();
        assert_eq!(bob_session.session_id, alice_session.session_id);

        println!("Step 7: Bob receives the messages out of order...");
        assert_eq!(text(&messages[2], &mut bob_session), "m3");
        assert_eq!(text(&messages[0], &mut bob_session), "m1");
        assert_eq!(text(&messages[1], &mut bob_session), "m2");
        assert_eq!(bob_session.ratchet().state().skipped_key_count(), 0);

        println!("Step 8: Replays are rejected...");
        assert_eq!(
            bob_session.receive(&messages[1]).err(),
            Some(Error::DecryptionFailed)
        );

        println!("Step 9: Bob replies to Alice...");
        let reply = bob_session
            .send(
                bob.identity(),
                &MessageContent::text("hi alice"),
                Some(messages[2].id.clone()),
            )
            .unwrap();
        assert!(reply.initiation.is_none());
        assert_eq!(text(&reply, &mut alice_session), "hi alice");
        assert!(alice_session.is_established());

        println!("Step 10: Testing session serialization and restoration...");
        let mut alice_restored = Session::deserialize(&alice_session.serialize().unwrap()).unwrap();
        let mut bob_restored = Session::deserialize(&bob_session.serialize().unwrap()).unwrap();

        println!("Step 11: Testing continued communication after restoration...");
        let next = alice_restored
            .send(alice.identity(), &MessageContent::text("how are you?"), None)
            .unwrap();
        assert!(next.initiation.is_none());
        assert_eq!(text(&next, &mut bob_restored), "how are you?");

        println!("Step 12: Several ratchet turnovers...");
        for round in 0..5 {
            let from_bob = bob_restored
                .send(bob.identity(), &MessageContent::text(format!("bob {round}")), None)
                .unwrap();
            assert_eq!(text(&from_bob, &mut alice_restored), format!("bob {round}"));

            let from_alice = alice_restored
                .send(
                    alice.identity(),
                    &MessageContent::text(format!("alice {round}")),
                    None,
                )
                .unwrap();
            assert_eq!(
                text(&from_alice, &mut bob_restored),
                format!("alice {round}")
            );
        }
        assert!(alice_restored.ratchet().state().epoch() >= 6);
    }

    #[test]
    fn test_lost_messages_across_turnover() {
        let alice = IdentityStore::new("alice", config()).unwrap();
        let mut bob = IdentityStore::new("bob", config()).unwrap();

        let mut alice_session = alice
            .create_outbound_session("bob", &bob.publish_bundle().unwrap())
            .unwrap();
        let first = alice_session
            .send(alice.identity(), &MessageContent::text("first"), None)
            .unwrap();
        let delayed = alice_session
            .send(alice.identity(), &MessageContent::text("delayed"), None)
            .unwrap();

        let mut bob_session = bob
            .create_inbound_session("alice", first.initiation.as_ref().unwrap())
            .unwrap();
        assert_eq!(text(&first, &mut bob_session), "first");

        let reply = bob_session
            .send(bob.identity(), &MessageContent::text("reply"), None)
            .unwrap();
        assert_eq!(text(&reply, &mut alice_session), "reply");

        let after = alice_session
            .send(alice.identity(), &MessageContent::text("after"), None)
            .unwrap();
        assert_eq!(text(&after, &mut bob_session), "after");
        assert_eq!(text(&delayed, &mut bob_session), "delayed");
    }

    #[test]
    fn test_replay_from_old_epoch_leaves_session_unchanged() {
        let alice = IdentityStore::new("alice", config()).unwrap();
        let mut bob = IdentityStore::new("bob", config()).unwrap();

        let mut alice_session = alice
            .create_outbound_session("bob", &bob.publish_bundle().unwrap())
            .unwrap();
        let first = alice_session
            .send(alice.identity(), &MessageContent::text("first"), None)
            .unwrap();
        let mut bob_session = bob
            .create_inbound_session("alice", first.initiation.as_ref().unwrap())
            .unwrap();
        assert_eq!(text(&first, &mut bob_session), "first");

        for round in 0..3 {
            let from_bob = bob_session
                .send(bob.identity(), &MessageContent::text(format!("bob {round}")), None)
                .unwrap();
            assert_eq!(text(&from_bob, &mut alice_session), format!("bob {round}"));

            let from_alice = alice_session
                .send(
                    alice.identity(),
                    &MessageContent::text(format!("alice {round}")),
                    None,
                )
                .unwrap();
            assert_eq!(
                text(&from_alice, &mut bob_session),
                format!("alice {round}")
            );
        }

        let state = bob_session.ratchet().state();
        let before = (
            state.epoch(),
            state.receiving_message_number(),
            state.sending_message_number(),
            state.skipped_key_count(),
            state.receiving_ratchet_public(),
        );
        assert_eq!(before.0, 3);

        assert_eq!(
            bob_session.receive(&first).err(),
            Some(Error::DecryptionFailed)
        );

        let state = bob_session.ratchet().state();
        assert_eq!(
            (
                state.epoch(),
                state.receiving_message_number(),
                state.sending_message_number(),
                state.skipped_key_count(),
                state.receiving_ratchet_public(),
            ),
            before
        );

        let next = alice_session
            .send(alice.identity(), &MessageContent::text("still here"), None)
            .unwrap();
        assert_eq!(text(&next, &mut bob_session), "still here");
    }

    #[test]
    fn test_skip_ceiling() {
        let limited = AccountConfig {
            session: SessionConfig {
                max_skipped_messages: 5,
                ..SessionConfig::default()
            },
            ..config()
        };
        let alice = IdentityStore::new("alice", config()).unwrap();
        let mut bob = IdentityStore::new("bob", limited).unwrap();

        let mut alice_session = alice
            .create_outbound_session("bob", &bob.publish_bundle().unwrap())
            .unwrap();
        let envelopes: Vec<_> = (0..8)
            .map(|n| {
                alice_session
                    .send(alice.identity(), &MessageContent::text(format!("{n}")), None)
                    .unwrap()
            })
            .collect();

        let mut bob_session = bob
            .create_inbound_session("alice", envelopes[0].initiation.as_ref().unwrap())
            .unwrap();
        assert_eq!(
            bob_session.receive(&envelopes[7]).err(),
            Some(Error::TooManySkippedMessages {
                requested: 7,
                limit: 5
            })
        );
        assert_eq!(text(&envelopes[5], &mut bob_session), "5");
        assert_eq!(text(&envelopes[7], &mut bob_session), "7");
    }

    #[test]
    fn test_tampered_envelopes_are_rejected() {
        let alice = IdentityStore::new("alice", config()).unwrap();
        let mut bob = IdentityStore::new("bob", config()).unwrap();

        let mut alice_session = alice
            .create_outbound_session("bob", &bob.publish_bundle().unwrap())
            .unwrap();
        let envelope = alice_session
            .send(alice.identity(), &MessageContent::text("secret"), None)
            .unwrap();
        let mut bob_session = bob
            .create_inbound_session("alice", envelope.initiation.as_ref().unwrap())
            .unwrap();

        let mut ciphertext = envelope.clone();
        ciphertext.encrypted_content.ciphertext[3] ^= 0x80;
        assert_eq!(
            bob_session.receive(&ciphertext).err(),
            Some(Error::AuthenticationFailed)
        );

        let mut nonce = envelope.clone();
        nonce.encrypted_content.nonce[0] ^= 0x01;
        assert_eq!(
            bob_session.receive(&nonce).err(),
            Some(Error::AuthenticationFailed)
        );

        let mut reply_to = envelope.clone();
        reply_to.reply_to = Some("forged".to_string());
        assert_eq!(
            bob_session.receive(&reply_to).err(),
            Some(Error::AuthenticationFailed)
        );

        let mut misrouted = envelope.clone();
        misrouted.recipient_id = "carol".to_string();
        assert!(matches!(
            bob_session.receive(&misrouted),
            Err(Error::InvalidEnvelope(_))
        ));

        assert_eq!(text(&envelope, &mut bob_session), "secret");
    }

    #[test]
    fn test_bundle_without_one_time_prekeys() {
        let alice = IdentityStore::new("alice", config()).unwrap();
        let mut bob = IdentityStore::new("bob", config()).unwrap();
        let bundle = bob
            .publish_bundle()
            .unwrap()
            .with_one_time_prekeys(Vec::new());

        let mut alice_session = alice.create_outbound_session("bob", &bundle).unwrap();
        let envelope = alice_session
            .send(alice.identity(), &MessageContent::text("no otpk"), None)
            .unwrap();
        assert_eq!(envelope.initiation.unwrap().one_time_prekey_id, None);

        let mut bob_session = bob
            .create_inbound_session("alice", envelope.initiation.as_ref().unwrap())
            .unwrap();
        assert_eq!(text(&envelope, &mut bob_session), "no otpk");

        let strict = IdentityStore::new(
            "alice",
            AccountConfig {
                session: SessionConfig {
                    require_one_time_prekey: true,
                    ..SessionConfig::default()
                },
                ..config()
            },
        )
        .unwrap();
        let error = strict.create_outbound_session("bob", &bundle).err().unwrap();
        assert_eq!(error, Error::InsufficientPrekeys);
        assert_eq!(
            error.user_message(),
            "cannot start secure session with this contact"
        );
    }

    #[test]
    fn test_conversations_with_persisted_identity() {
        let identity_store = MemoryIdentityKeyStore::new();

        println!("Step 1: Alice creates and persists her identity...");
        let alice = IdentityStore::new("alice", config()).unwrap();
        identity_store
            .store_identity(&alice.serialize().unwrap())
            .unwrap();
        let alice = IdentityStore::deserialize(&identity_store.load_identity().unwrap().unwrap())
            .unwrap();

        println!("Step 2: Alice trusts Bob's identity on first use...");
        let mut bob = IdentityStore::new("bob", config()).unwrap();
        let bundle = bob.publish_bundle().unwrap();
        let bob_key = bundle.signing_key().to_bytes();
        assert!(identity_store.is_trusted_identity("bob", &bob_key).unwrap());
        identity_store.save_identity("bob", &bob_key).unwrap();

        println!("Step 3: Both sides exchange messages through their registries...");
        let alice_conversations =
            Conversations::new(alice.identity_handle(), MemorySessionStore::new());
        alice_conversations
            .insert(alice.create_outbound_session("bob", &bundle).unwrap())
            .unwrap();
        let hello = alice_conversations
            .send("bob", &MessageContent::text("hello"), None)
            .unwrap();

        let bob_conversations = Conversations::new(bob.identity_handle(), MemorySessionStore::new());
        bob_conversations
            .insert(
                bob.create_inbound_session("alice", hello.initiation.as_ref().unwrap())
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(
            bob_conversations.receive(&hello).unwrap(),
            MessageContent::text("hello")
        );

        let reply = bob_conversations
            .send("alice", &MessageContent::text("welcome"), None)
            .unwrap();
        assert_eq!(
            alice_conversations.receive(&reply).unwrap(),
            MessageContent::text("welcome")
        );
        assert!(
            alice_conversations
                .with_session("bob", |session| session.is_established())
                .unwrap()
        );

        println!("Step 4: Removing a conversation forgets it...");
        alice_conversations.remove("bob").unwrap();
        assert_eq!(
            alice_conversations
                .send("bob", &MessageContent::text("gone"), None)
                .err(),
            Some(Error::SessionNotEstablished)
        );
    }
}
