use super::resolve::print_record;
use crate::services::SearchRequest;
use crate::state::SharedState;

pub async fn cmd_search(state: &SharedState, query: &str, ranked: bool) -> anyhow::Result<()> {
    println!("Searching for: {query}");

    if ranked {
        let matches = state.search.ranked(query, 10).await?;
        if matches.is_empty() {
            println!("No anime found matching '{query}'");
            return Ok(());
        }
        println!();
        println!("{:-<60}", "");
        for found in &matches {
            println!("[{:>5.1}] {}", found.relevance, found.anime.name);
        }
        return Ok(());
    }

    let results = state.search.search(&SearchRequest::text(query)).await?;
    if results.is_empty() {
        println!("No anime found matching '{query}'");
        return Ok(());
    }

    println!();
    println!("Search Results:");
    println!("{:-<60}", "");
    for record in &results {
        print_record(record);
        println!();
    }

    state.pool.wait_idle().await;
    Ok(())
}
