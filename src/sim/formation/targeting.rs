//! Per-tactic target assignment
//!
//! Pure functions over snapshots of both sides' alive units. Each returns one
//! `(attacker, target)` pair per attacker, in attacker order.

use super::shape::UnitRole;
use crate::sim::entity::EntityId;
use crate::util::vec2::Vec2;
use rand::Rng;

/// Snapshot of one alive unit taken before targets are assigned
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Combatant {
    pub entity: EntityId,
    pub role: UnitRole,
    pub position: Vec2,
}

pub type Assignment = (EntityId, EntityId);

/// Half the attackers (at least one) on the enemy leader, the rest round-robin.
/// Without an enemy leader every attacker picks a uniformly random enemy.
pub fn assign_aggressive<R: Rng + ?Sized>(
    attackers: &[Combatant],
    enemies: &[Combatant],
    rng: &mut R,
) -> Vec<Assignment> {
    if enemies.is_empty() {
        return Vec::new();
    }

    match enemies.iter().find(|e| e.role == UnitRole::Leader) {
        Some(leader) => {
            let on_leader = (attackers.len() / 2).max(1);
            attackers
                .iter()
                .enumerate()
                .map(|(i, unit)| {
                    let target = if i < on_leader {
                        leader.entity
                    } else {
                        enemies[i % enemies.len()].entity
                    };
                    (unit.entity, target)
                })
                .collect()
        }
        None => attackers
            .iter()
            .map(|unit| (unit.entity, enemies[rng.gen_range(0..enemies.len())].entity))
            .collect(),
    }
}

/// Our leader takes the enemy nearest to itself; everyone else screens the
/// leader by taking the enemy nearest to it. Leaderless units fend for themselves.
pub fn assign_defensive(attackers: &[Combatant], enemies: &[Combatant]) -> Vec<Assignment> {
    if enemies.is_empty() {
        return Vec::new();
    }

    let leader = attackers.iter().find(|u| u.role == UnitRole::Leader);
    attackers
        .iter()
        .filter_map(|unit| {
            let anchor = match leader {
                Some(leader) => leader.position,
                None => unit.position,
            };
            nearest(anchor, enemies).map(|target| (unit.entity, target.entity))
        })
        .collect()
}

/// One-to-one in order, wrapping around the enemy list
pub fn assign_round_robin(attackers: &[Combatant], enemies: &[Combatant]) -> Vec<Assignment> {
    if enemies.is_empty() {
        return Vec::new();
    }
    attackers
        .iter()
        .enumerate()
        .map(|(i, unit)| (unit.entity, enemies[i % enemies.len()].entity))
        .collect()
}

pub fn nearest(from: Vec2, candidates: &[Combatant]) -> Option<&Combatant> {
    candidates.iter().min_by(|a, b| {
        from.distance_sq_to(a.position)
            .total_cmp(&from.distance_sq_to(b.position))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn unit(id: u64, role: UnitRole, x: f32, y: f32) -> Combatant {
        Combatant {
            entity: EntityId(id),
            role,
            position: Vec2::new(x, y),
        }
    }

    fn squad(base: u64, x: f32, count: u64) -> Vec<Combatant> {
        (0..count)
            .map(|i| {
                let role = if i == 0 { UnitRole::Leader } else { UnitRole::Soldier };
                unit(base + i, role, x, i as f32)
            })
            .collect()
    }

    #[test]
    fn test_round_robin_wraps() {
        let ours = squad(1, 0.0, 5);
        let theirs = squad(100, 10.0, 2);
        let targets: Vec<u64> = assign_round_robin(&ours, &theirs)
            .into_iter()
            .map(|(_, t)| t.0)
            .collect();
        assert_eq!(targets, vec![100, 101, 100, 101, 100]);
    }

    #[test]
    fn test_aggressive_focuses_enemy_leader() {
        let mut rng = StdRng::seed_from_u64(1);
        let ours = squad(1, 0.0, 5);
        let theirs = squad(100, 10.0, 3);
        let assignment = assign_aggressive(&ours, &theirs, &mut rng);

        let on_leader = assignment.iter().filter(|(_, t)| *t == EntityId(100)).count();
        assert!(on_leader >= 2);
        // First half always goes for the leader
        assert_eq!(assignment[0].1, EntityId(100));
        assert_eq!(assignment[1].1, EntityId(100));
        assert_eq!(assignment[2].1, theirs[2].entity);
        assert_eq!(assignment[3].1, theirs[0].entity);
    }

    #[test]
    fn test_aggressive_single_attacker_still_hits_leader() {
        let mut rng = StdRng::seed_from_u64(1);
        let ours = squad(1, 0.0, 1);
        let theirs = squad(100, 10.0, 3);
        assert_eq!(assign_aggressive(&ours, &theirs, &mut rng), vec![(EntityId(1), EntityId(100))]);
    }

    #[test]
    fn test_aggressive_without_leader_is_random_but_valid() {
        let mut rng = StdRng::seed_from_u64(42);
        let ours = squad(1, 0.0, 20);
        let theirs: Vec<Combatant> = (0..3).map(|i| unit(100 + i, UnitRole::Soldier, 5.0, 0.0)).collect();

        let assignment = assign_aggressive(&ours, &theirs, &mut rng);
        assert_eq!(assignment.len(), 20);
        assert!(assignment.iter().all(|(_, t)| (100..103).contains(&t.0)));
    }

    #[test]
    fn test_defensive_screens_leader() {
        let ours = vec![
            unit(1, UnitRole::Leader, 0.0, 0.0),
            unit(2, UnitRole::Soldier, 10.0, 0.0),
            unit(3, UnitRole::Guard, -10.0, 0.0),
        ];
        let theirs = vec![
            unit(100, UnitRole::Leader, 11.0, 0.0),
            unit(101, UnitRole::Soldier, 2.0, 0.0),
        ];
        let assignment = assign_defensive(&ours, &theirs);
        // Everyone targets the enemy closest to our leader, even the soldier standing next to 100
        assert!(assignment.iter().all(|(_, t)| *t == EntityId(101)));
    }

    #[test]
    fn test_defensive_without_leader_uses_own_position() {
        let ours = vec![
            unit(2, UnitRole::Soldier, 10.0, 0.0),
            unit(3, UnitRole::Soldier, -10.0, 0.0),
        ];
        let theirs = vec![
            unit(100, UnitRole::Soldier, 11.0, 0.0),
            unit(101, UnitRole::Soldier, -9.0, 0.0),
        ];
        let assignment = assign_defensive(&ours, &theirs);
        assert_eq!(
            assignment,
            vec![(EntityId(2), EntityId(100)), (EntityId(3), EntityId(101))]
        );
    }

    #[test]
    fn test_no_enemies_no_assignment() {
        let mut rng = StdRng::seed_from_u64(0);
        let ours = squad(1, 0.0, 3);
        assert!(assign_aggressive(&ours, &[], &mut rng).is_empty());
        assert!(assign_defensive(&ours, &[]).is_empty());
        assert!(assign_round_robin(&ours, &[]).is_empty());
    }
}
