//! Position reconstruction from the tester's own deal lines.
//!
//! A deal opposite to an open position on the same symbol closes the oldest
//! such position; any other deal opens a new one. A position is identified by
//! its opening order number (the deal number when no order is given), which
//! is the ticket the advisor prints on its break-even and trailing lines.
//! Partial closes are not modelled: one deal closes one position.

use std::collections::VecDeque;

use chrono::NaiveDateTime;

use super::event::{Deal, Side, TradeClose, TradeOpen};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DealRole {
    pub position: u64,
    pub opening: bool,
}

struct OpenPosition<'d> {
    id: u64,
    side: Side,
    symbol: &'d str,
}

/// One role per deal, in the order given. `deals` must be sorted by
/// timestamp then line.
pub fn assign_positions(deals: &[Deal]) -> Vec<DealRole> {
    let mut open: VecDeque<OpenPosition<'_>> = VecDeque::new();
    let mut roles = Vec::with_capacity(deals.len());

    for deal in deals {
        let closes = open
            .iter()
            .position(|p| p.symbol == deal.symbol && p.side == deal.side.opposite());
        match closes.and_then(|index| open.remove(index)) {
            Some(position) => roles.push(DealRole {
                position: position.id,
                opening: false,
            }),
            None => {
                let id = deal.order_id.unwrap_or(deal.deal_id);
                open.push_back(OpenPosition {
                    id,
                    side: deal.side,
                    symbol: &deal.symbol,
                });
                roles.push(DealRole {
                    position: id,
                    opening: true,
                });
            }
        }
    }
    roles
}

/// Gives advisor open and close lines that carry no ticket the position of a
/// deal executed at the same instant. An open takes an opening deal on the
/// same side; a close takes any closing deal. Each deal is used once.
///
/// Returns the number of lines stamped.
pub fn stamp_tickets(opens: &mut [TradeOpen], closes: &mut [TradeClose], deals: &[Deal]) -> usize {
    if deals.is_empty() {
        return 0;
    }
    let roles = assign_positions(deals);
    let mut used = vec![false; deals.len()];
    let mut stamped = 0;

    for open in opens.iter_mut().filter(|o| o.ticket.is_none()) {
        let side = open.side;
        let claimed = claim(deals, &roles, &mut used, open.ts, |deal, role| {
            role.opening && deal.side == side
        });
        if let Some(index) = claimed {
            open.ticket = Some(roles[index].position);
            stamped += 1;
        }
    }
    for close in closes.iter_mut().filter(|c| c.ticket.is_none()) {
        let claimed = claim(deals, &roles, &mut used, close.ts, |_, role| !role.opening);
        if let Some(index) = claimed {
            close.ticket = Some(roles[index].position);
            stamped += 1;
        }
    }
    stamped
}

fn claim<F>(
    deals: &[Deal],
    roles: &[DealRole],
    used: &mut [bool],
    ts: NaiveDateTime,
    accept: F,
) -> Option<usize>
where
    F: Fn(&Deal, &DealRole) -> bool,
{
    let start = deals.partition_point(|d| d.ts < ts);
    let index = (start..deals.len())
        .take_while(|&i| deals[i].ts == ts)
        .find(|&i| !used[i] && accept(&deals[i], &roles[i]))?;
    used[index] = true;
    Some(index)
}
