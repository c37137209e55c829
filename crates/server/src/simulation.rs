use std::collections::HashMap;
use std::f32::consts::TAU;

use glam::Vec3;

use ripple::{DatagramSocket, SessionManager, World};

/// Golden-angle spiral so consecutive spawns do not stack.
pub fn spawn_point(index: u32, radius: f32) -> Vec3 {
    let angle = index as f32 * TAU * 0.381_966;
    Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius)
}

/// Advances `world` by one frame, pulling each avatar's command for the
/// frame being simulated from its session.
pub fn step_world<S: DatagramSocket>(
    world: &mut World,
    sessions: &mut SessionManager<S>,
    avatars: &HashMap<u32, u16>,
    dt: f32,
) {
    let frame = world.frame();
    for (_, session) in sessions.iter_mut() {
        if !session.is_connected() {
            continue;
        }
        let Some(&entity_id) = avatars.get(&session.id()) else {
            continue;
        };

        let command = session.get_user_command(frame);
        world.apply_command(entity_id, &command, dt);
    }
    world.advance_frame();
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use ripple::net::loopback_pair;
    use ripple::{ClientSession, LoopbackSocket, SessionConfig, UserCommand};

    use super::*;

    #[test]
    fn spawn_points_stay_on_circle() {
        for index in 0..8 {
            let point = spawn_point(index, 3.0);
            assert!((point.length() - 3.0).abs() < 1e-4);
        }
        assert!(spawn_point(0, 3.0).distance(spawn_point(1, 3.0)) > 1.0);
    }

    #[test]
    fn step_applies_client_input() {
        let mut world = World::new();
        let mut sessions: SessionManager<LoopbackSocket> =
            SessionManager::new(4, SessionConfig::default());
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        let (server_end, client_end) = loopback_pair();
        let id = sessions.accept(addr, server_end).unwrap();
        let entity = world.spawn(Vec3::ZERO);
        let avatars = HashMap::from([(id, entity)]);

        let mut client = ClientSession::new(0, client_end, SessionConfig::default());
        client.pump();
        client.record_user_command(UserCommand {
            vertical: 127,
            ..UserCommand::idle(0)
        });
        client.transmit_client_frame(0).unwrap();
        sessions.pump_all();

        step_world(&mut world, &mut sessions, &avatars, 0.5);

        assert_eq!(world.frame(), 1);
        assert!(world.get(entity).unwrap().position.z < -1.0);
    }
}
