use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

use llm_interface::{DeepSeekProvider, StdoutSink};
use rag_agent::TreeholeAgent;
use result_cache::open_cache;
use treehole_client::TreeholeApiClient;
use treehole_core::{AppConfig, QueryAnswer};

const CONFIG_ENV: &str = "TREEHOLE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

type Input = Lines<BufReader<Stdin>>;

fn config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
        .into()
}

fn load_config() -> anyhow::Result<AppConfig> {
    let path = config_path();
    let config = if path.exists() {
        AppConfig::load(&path)
            .with_context(|| format!("failed to load {}", path.display()))?
    } else {
        tracing::info!(
            "No config file at {}, using defaults and environment",
            path.display()
        );
        AppConfig::from_env()
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn prompt(input: &mut Input, label: &str) -> anyhow::Result<Option<String>> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;
    Ok(input.next_line().await?.map(|line| line.trim().to_string()))
}

fn print_sources(answer: &QueryAnswer) {
    if answer.sources.is_empty() {
        return;
    }
    println!("\n参考来源 ({} 条):", answer.num_sources);
    for source in &answer.sources {
        match &source.entity_label {
            Some(label) => println!("  [{}] #{} {}", label, source.post_id, source.text_preview),
            None => println!("  #{} {}", source.post_id, source.text_preview),
        }
    }
    if let Some(history) = &answer.search_history {
        println!("\n搜索记录:");
        for step in history {
            println!("  {}. {}", step.index, step.keyword);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "treehole_rag=info,rag_agent=info,treehole_client=info,llm_interface=info,result_cache=info"
                    .into()
            }),
        )
        .init();

    tracing::info!("Starting Treehole RAG");

    let config = load_config()?;
    let api = Arc::new(TreeholeApiClient::new(&config.forum, config.agent.max_retries)?);
    let engine = Arc::new(DeepSeekProvider::new(&config.llm)?);
    let cache = open_cache(&config.cache)
        .await
        .context("failed to open result cache")?;

    let mut agent = TreeholeAgent::new(api, engine, &config)
        .with_cache(cache)
        .with_output_sink(Arc::new(StdoutSink))
        .with_progress(Arc::new(|message: &str| println!("{}", message)));

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        println!("\n选择模式: 1) 关键词检索  2) 智能检索  3) 课程测评  q) 退出");
        let Some(choice) = prompt(&mut input, "> ").await? else {
            break;
        };

        let answer = match choice.as_str() {
            "1" => {
                let Some(keyword) = prompt(&mut input, "搜索关键词: ").await? else {
                    break;
                };
                let Some(question) = prompt(&mut input, "你的问题: ").await? else {
                    break;
                };
                agent.manual_search(&keyword, &question).await
            }
            "2" => {
                let Some(question) = prompt(&mut input, "你的问题: ").await? else {
                    break;
                };
                agent.auto_search(&question).await
            }
            "3" => {
                let Some(subject) = prompt(&mut input, "课程名称: ").await? else {
                    break;
                };
                let Some(labels) = prompt(&mut input, "老师 (可多个，逗号分隔，可留空): ").await?
                else {
                    break;
                };
                agent.course_review(&subject, &labels).await
            }
            "q" | "Q" => break,
            "" => continue,
            other => {
                println!("未知选项: {}", other);
                continue;
            }
        };

        print_sources(&answer);
    }

    tracing::info!("Bye");
    Ok(())
}
