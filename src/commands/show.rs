use crate::context::AppContext;
use crate::models::PickRecord;
use crate::store::{load_candidates, load_pick};
use anyhow::Result;
use log::warn;

pub fn run(app: &AppContext, top: usize) -> Result<()> {
    let settings = app.settings();

    match load_pick(&settings.pick_file) {
        Ok(Some(PickRecord::Selected(pick))) => {
            println!("Pick for {}: {}", pick.date, pick.ticker);
            println!("  Price:     {:.2}", pick.price);
            println!("  Momentum:  {:.2}%", pick.momentum);
            println!("  Score:     {:.4}", pick.score);
            println!(
                "  Position:  {} shares for {:.2} of {:.2}",
                pick.qty, pick.cost, pick.invest_amount
            );
            if let Some(target) = pick.target_price {
                println!("  Target:    {:.2}", target);
            }
            if let Some(stop) = pick.stop_loss {
                println!("  Stop loss: {:.2}", stop);
            }
            if let Some(scoring) = pick.scoring.as_deref() {
                println!("  Scoring:   {}", scoring);
            }
        }
        Ok(Some(PickRecord::NoPick { date, reason })) => {
            println!("No pick for {}: {}", date, reason);
        }
        Ok(None) => println!("Pick not available at {}", settings.pick_file.display()),
        Err(err) => {
            warn!("{:#}", err);
            println!("Pick not available at {}", settings.pick_file.display());
        }
    }

    match load_candidates(&settings.candidates_file, top) {
        Ok(Some(candidates)) if !candidates.is_empty() => {
            println!();
            println!(
                "{:<4} {:<14} {:>12} {:>10} {:>10} {:>14} {:>12}",
                "#", "Ticker", "Latest", "Mom %", "Vol", "Avg volume", "Score"
            );
            for (idx, candidate) in candidates.iter().enumerate() {
                println!(
                    "{:<4} {:<14} {:>12.2} {:>10.2} {:>10.4} {:>14.0} {:>12.4}",
                    idx + 1,
                    candidate.ticker,
                    candidate.latest_price,
                    candidate.momentum_pct,
                    candidate.volatility,
                    candidate.avg_volume,
                    candidate.score
                );
            }
        }
        Ok(_) => {}
        Err(err) => warn!("Candidates unavailable: {:#}", err),
    }

    Ok(())
}
