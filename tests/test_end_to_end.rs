//! End-to-end scenarios wiring [`ServerController`] and [`ClientController`]
//! together by hand, without a real transport: bytes are shuttled directly
//! between `drain_outbox` and `handle_message`.

mod common;

use std::time::Duration;

use common::{bump_payload, CounterConfig, Counter, BUMP_KIND};
use tss_rollback::wire::Envelope;
use tss_rollback::{
    ClientController, ClientEvent, ConnectionState, EntityId, Frame, PlayerHandle,
    ServerController, ServerEvent, Snapshot,
};

const FPS: u32 = 60;

/// Steps `tick` exactly `frames` times, one frame's worth of elapsed time at
/// a time. Driving a whole multi-frame span through a single large `Duration`
/// would be subject to floating-point rounding in the controller's internal
/// accumulator; stepping one frame per call keeps each call's elapsed time
/// bit-identical to the controller's own per-frame duration.
fn advance(frames: u32, mut tick: impl FnMut(Duration)) {
    let dt = Duration::from_secs_f64(1.0 / f64::from(FPS));
    for _ in 0..frames {
        tick(dt);
    }
}

fn join(server: &mut ServerController<CounterConfig, u32>, client: &mut ClientController<CounterConfig>, addr: u32) {
    client.connect("nova", vec![]);
    let req = client.drain_outbox();
    for bytes in req {
        server.handle_message(addr, &bytes);
    }
    let server_events = server.drain_events();
    assert!(matches!(server_events[0], ServerEvent::PlayerJoined { .. }));
    for (_, bytes) in server.drain_outbox() {
        client.handle_message(&bytes);
    }
    let client_events = client.drain_events();
    assert!(matches!(client_events[0], ClientEvent::Connected { .. }));
    assert_eq!(client.connection_state(), ConnectionState::Connected);
}

/// Scenario 1: command echo. A locally-submitted command is echoed back by
/// the server and upgrades the client's local entry without triggering a
/// rollback (the frame has not been stepped past yet).
#[test]
fn command_echo_upgrades_without_rollback() {
    let mut server: ServerController<CounterConfig, u32> = ServerController::new(vec![0, 10], None, FPS);
    let mut client: ClientController<CounterConfig> = ClientController::new(vec![0, 10], FPS);
    join(&mut server, &mut client, 1);

    advance(100, |d| server.update(d).unwrap());
    advance(100, |d| client.update(d).unwrap());
    assert_eq!(client.current_frame(), Frame::new(100));

    client.submit_command(BUMP_KIND, bump_payload(EntityId::new(1), 5)).unwrap();
    let outgoing = client.drain_outbox();
    assert_eq!(outgoing.len(), 1);

    for bytes in outgoing {
        server.handle_message(1, &bytes);
    }
    assert!(server.drain_events().is_empty());

    let echoed = server.drain_outbox();
    assert_eq!(echoed.len(), 1);
    for (_, bytes) in echoed {
        client.handle_message(&bytes);
    }

    assert!(client.drain_events().is_empty());
    assert_eq!(client.current_frame(), Frame::new(100));
}

/// Scenario 2: a late authoritative command for a frame well behind the
/// leading frame (but at or after the trailing frame) rolls back and
/// replays only the affected snapshots, with no error surfaced.
#[test]
fn late_command_rolls_back_without_error() {
    let mut client: ClientController<CounterConfig> = ClientController::new(vec![0, 10], FPS);
    client.connect("nova", vec![]);
    client.drain_outbox();
    let empty_state = Snapshot::<CounterConfig>::new(Frame::new(0)).serialize().into_bytes();
    client.handle_message(
        &Envelope::JoinAccept { player_id: PlayerHandle::new(1), current_frame: Frame::new(0), state: empty_state }.encode(),
    );
    client.drain_events();

    advance(120, |d| client.update(d).unwrap());
    assert_eq!(client.current_frame(), Frame::new(120));

    let late = Envelope::Command {
        player_id: PlayerHandle::new(2),
        frame: Frame::new(115),
        kind: BUMP_KIND,
        payload: bump_payload(EntityId::new(1), 1),
    };
    client.handle_message(&late.encode());

    assert!(client.drain_events().is_empty());
    assert_eq!(client.current_frame(), Frame::new(120));
}

/// Scenario 3: a hash mismatch triggers a full resync request; once the
/// server's snapshot is installed, a subsequent hash check for the same
/// frame passes.
#[test]
fn hash_drift_triggers_resync_then_passes() {
    let mut client: ClientController<CounterConfig> = ClientController::new(vec![0, 10], FPS);
    client.connect("nova", vec![]);
    client.drain_outbox();
    let empty_state = Snapshot::<CounterConfig>::new(Frame::new(0)).serialize().into_bytes();
    client.handle_message(
        &Envelope::JoinAccept { player_id: PlayerHandle::new(1), current_frame: Frame::new(0), state: empty_state }.encode(),
    );
    client.drain_events();

    advance(510, |d| client.update(d).unwrap());

    client.handle_message(&Envelope::HashCheck { trailing_frame: Frame::new(500), hash: 0xDEAD_BEEF }.encode());
    let events = client.drain_events();
    assert!(matches!(events[0], ClientEvent::DesyncDetected { frame } if frame == Frame::new(500)));
    let outbox = client.drain_outbox();
    assert!(matches!(Envelope::decode(&outbox[0]).unwrap(), Envelope::GameStateRequest));

    let resync_state = Snapshot::<CounterConfig>::new(Frame::new(500)).serialize().into_bytes();
    client.handle_message(&Envelope::GameStateResponse { snapshot: resync_state }.encode());
    let events = client.drain_events();
    assert!(matches!(events[0], ClientEvent::Resynced { frame } if frame == Frame::new(500)));
    assert_eq!(client.current_frame(), Frame::new(500));

    let expected_hash = {
        let mut hasher = tss_rollback::hash::DeterministicHasher::new();
        hasher.write_i32(500);
        hasher.finish()
    };
    client.handle_message(&Envelope::HashCheck { trailing_frame: Frame::new(500), hash: expected_hash }.encode());
    assert!(client.drain_events().is_empty());
}

/// Scenario 4: a client joining a session with an established leading frame
/// initializes its TSS at that frame, and a subsequent authoritative command
/// for a future frame is accepted without any rewind (no error surfaced).
#[test]
fn join_with_existing_state_accepts_future_command_without_rewind() {
    let mut server: ServerController<CounterConfig, u32> = ServerController::new(vec![0, 10], None, FPS);
    advance(1000, |d| server.update(d).unwrap());
    assert_eq!(server.current_frame(), Frame::new(1000));

    let mut client: ClientController<CounterConfig> = ClientController::new(vec![0, 10], FPS);
    join(&mut server, &mut client, 7);
    assert_eq!(client.current_frame(), Frame::new(1000));

    advance(3, |d| server.update(d).unwrap());
    assert_eq!(server.current_frame(), Frame::new(1003));

    server.handle_message(
        7,
        &Envelope::Command {
            player_id: PlayerHandle::new(1),
            frame: Frame::new(1003),
            kind: BUMP_KIND,
            payload: bump_payload(EntityId::new(1), 9),
        }
        .encode(),
    );
    assert!(server.drain_events().is_empty());

    for (_, bytes) in server.drain_outbox() {
        client.handle_message(&bytes);
    }
    assert!(client.drain_events().is_empty());
}

/// Scenario 5: two peers receiving the same two entity-spawn commands in
/// opposite arrival order converge on the same snapshot hash.
#[test]
fn entity_spawn_order_does_not_affect_convergent_hash() {
    fn new_connected_client() -> ClientController<CounterConfig> {
        let mut client: ClientController<CounterConfig> = ClientController::new(vec![0], FPS);
        client.connect("nova", vec![]);
        client.drain_outbox();
        let empty_state = Snapshot::<CounterConfig>::new(Frame::new(0)).serialize().into_bytes();
        client.handle_message(
            &Envelope::JoinAccept { player_id: PlayerHandle::new(1), current_frame: Frame::new(0), state: empty_state }.encode(),
        );
        client.drain_events();
        client
    }

    fn add_entity_envelope(entity: &Counter, frame: Frame) -> Envelope {
        use tss_rollback::Entity as _;
        let mut w = tss_rollback::packet::WritePacket::new();
        entity.serialize(&mut w);
        Envelope::AddEntity { frame, entity: w.into_bytes() }
    }

    let x = Counter { id: EntityId::new(1), value: 10 };
    let y = Counter { id: EntityId::new(2), value: 20 };

    let mut a = new_connected_client();
    a.handle_message(&add_entity_envelope(&x, Frame::new(200)).encode());
    a.handle_message(&add_entity_envelope(&y, Frame::new(200)).encode());

    let mut b = new_connected_client();
    b.handle_message(&add_entity_envelope(&y, Frame::new(200)).encode());
    b.handle_message(&add_entity_envelope(&x, Frame::new(200)).encode());

    advance(200, |d| a.update(d).unwrap());
    advance(200, |d| b.update(d).unwrap());

    assert_eq!(a.leading_snapshot().hash(), b.leading_snapshot().hash());
}

/// Scenario 6: a client stalled long enough that its trailing frame has
/// already passed a late command's frame cannot roll back; this is surfaced
/// as a full-resync request rather than a `CommandRejected` event.
#[test]
fn resync_deeper_than_trailing_requests_full_state() {
    let mut client: ClientController<CounterConfig> = ClientController::new(vec![0, 10], FPS);
    client.connect("nova", vec![]);
    client.drain_outbox();
    let empty_state = Snapshot::<CounterConfig>::new(Frame::new(0)).serialize().into_bytes();
    client.handle_message(
        &Envelope::JoinAccept { player_id: PlayerHandle::new(1), current_frame: Frame::new(0), state: empty_state }.encode(),
    );
    client.drain_events();

    advance(460, |d| client.update(d).unwrap());

    client.handle_message(
        &Envelope::Command {
            player_id: PlayerHandle::new(2),
            frame: Frame::new(300),
            kind: BUMP_KIND,
            payload: bump_payload(EntityId::new(1), 1),
        }
        .encode(),
    );

    let events = client.drain_events();
    assert!(events.iter().all(|e| !matches!(e, ClientEvent::CommandRejected { .. })));
    let outbox = client.drain_outbox();
    assert!(outbox.iter().any(|bytes| matches!(Envelope::decode(bytes).unwrap(), Envelope::GameStateRequest)));
}

/// Scenario 7: the client submits a command, but network delay means it
/// does not reach the server until well after the server's trailing frame
/// has passed it. The server rejects it and notifies the submitter over the
/// wire; the client purges its own optimistic local copy in response.
#[test]
fn server_rejects_own_command_and_client_purges_optimistic_copy() {
    let mut server: ServerController<CounterConfig, u32> = ServerController::new(vec![0, 10], None, FPS);
    let mut client: ClientController<CounterConfig> = ClientController::new(vec![0, 10], FPS);
    join(&mut server, &mut client, 1);

    advance(20, |d| server.update(d).unwrap());
    advance(20, |d| client.update(d).unwrap());
    assert_eq!(client.current_frame(), Frame::new(20));

    client.submit_command(BUMP_KIND, bump_payload(EntityId::new(1), 7)).unwrap();
    let delayed = client.drain_outbox();
    assert_eq!(delayed.len(), 1);

    // The command sits in flight while the server's own trailing frame
    // advances well past frame 20, so when it finally arrives the server's
    // trailing frame has already left it behind.
    advance(1000, |d| server.update(d).unwrap());

    for bytes in delayed {
        server.handle_message(1, &bytes);
    }
    let server_events = server.drain_events();
    assert!(matches!(server_events[0], ServerEvent::CommandRejected { .. }));

    let outbox = server.drain_outbox();
    assert_eq!(outbox.len(), 1);
    for (_, bytes) in outbox {
        client.handle_message(&bytes);
    }

    let client_events = client.drain_events();
    assert!(matches!(client_events[0], ClientEvent::CommandRejected { .. }));
}
