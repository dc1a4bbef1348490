//! 카드 시세 수집기 CLI.

use clap::{Parser, Subcommand, ValueEnum};
use folio_collector::modules::{
    self, AnalysisKind, CardCollectOptions, PriceMapOptions, SealedImageOptions, SetCollectOptions,
};
use folio_collector::{scheduler, CollectorConfig, CollectorContext, JobOutcome};
use folio_core::{init_logging, job_span, InvocationMethod, LogConfig};
use std::sync::Arc;
use tracing::Instrument;

const METHOD: InvocationMethod = InvocationMethod::Manual;

#[derive(Parser)]
#[command(name = "folio-collector")]
#[command(about = "Pokefolio card price collector", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// 수집 작업 실행
    Collect {
        #[command(subcommand)]
        job: CollectJob,
    },

    /// 가격 변동 분석 실행
    Analyze {
        #[arg(value_enum)]
        kind: AnalysisTarget,
    },

    /// 분석 파티션 추적 상태 조회
    Tracking {
        #[arg(value_enum)]
        kind: AnalysisTarget,
    },

    /// 데몬 모드: cron 스케줄에 따라 작업 실행
    Daemon,
}

#[derive(Subcommand)]
enum CollectJob {
    /// 세트 메타데이터/이미지
    Sets {
        /// `pfdata_sets` 갱신
        #[arg(long)]
        meta: bool,
        /// 심볼/로고 업로드
        #[arg(long)]
        image: bool,
    },

    /// 카드 메타데이터/이미지
    Cards {
        #[arg(long)]
        meta: bool,
        #[arg(long)]
        image: bool,
        /// 특정 세트만 수집 (예: "sv1")
        #[arg(long)]
        set: Option<String>,
    },

    /// 카드 ↔ TCGPlayer 상품 매핑
    PriceMap {
        /// 특정 세트만 매핑
        #[arg(long)]
        set: Option<String>,
    },

    /// TCGPlayer 카드 시세
    CardPrices,

    /// TCGPlayer 실드 상품 시세
    SealedPrices,

    /// 실드 상품 이미지 업로드
    SealedImages {
        #[arg(long)]
        set: Option<String>,
    },

    /// USD 기준 환율
    CurrencyRates,

    /// 사용자별 포트폴리오 가치
    PortfolioValues,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AnalysisTarget {
    Card,
    Graded,
    Sealed,
    All,
}

impl AnalysisTarget {
    fn kinds(self) -> Vec<AnalysisKind> {
        match self {
            Self::Card => vec![AnalysisKind::Card],
            Self::Graded => vec![AnalysisKind::Graded],
            Self::Sealed => vec![AnalysisKind::Sealed],
            Self::All => AnalysisKind::ALL.to_vec(),
        }
    }
}

/// 결과 요약 출력. 성공 여부를 반환합니다.
fn print_outcome(job: &str, outcome: &JobOutcome) -> bool {
    println!(
        "{}: {} (errors: {}, log: {})",
        job,
        outcome.status(),
        outcome.errors,
        outcome.log_id
    );
    outcome.state
}

async fn run_collect(ctx: &CollectorContext, job: CollectJob) -> folio_collector::Result<bool> {
    let (name, outcome) = match job {
        CollectJob::Sets { meta, image } => {
            if !meta && !image {
                tracing::warn!("--meta 또는 --image 중 하나 이상을 지정하세요");
            }
            let options = SetCollectOptions { meta, images: image };
            let name = modules::sets::JOB_NAME;
            let outcome = modules::collect_sets(ctx, options, METHOD)
                .instrument(job_span!(name))
                .await?;
            (name, outcome)
        }
        CollectJob::Cards { meta, image, set } => {
            if !meta && !image {
                tracing::warn!("--meta 또는 --image 중 하나 이상을 지정하세요");
            }
            let options = CardCollectOptions {
                meta,
                images: image,
                set_id: set,
            };
            let name = modules::cards::JOB_NAME;
            let outcome = modules::collect_cards(ctx, options, METHOD)
                .instrument(job_span!(name))
                .await?;
            (name, outcome)
        }
        CollectJob::PriceMap { set } => {
            let name = modules::price_map::JOB_NAME;
            let options = PriceMapOptions { set_id: set };
            let outcome = modules::collect_price_map(ctx, options, METHOD)
                .instrument(job_span!(name))
                .await?;
            (name, outcome)
        }
        CollectJob::CardPrices => {
            let name = modules::card_prices::JOB_NAME;
            let outcome = modules::collect_card_prices(ctx, METHOD)
                .instrument(job_span!(name))
                .await?;
            (name, outcome)
        }
        CollectJob::SealedPrices => {
            let name = modules::sealed_prices::JOB_NAME;
            let outcome = modules::collect_sealed_prices(ctx, METHOD)
                .instrument(job_span!(name))
                .await?;
            (name, outcome)
        }
        CollectJob::SealedImages { set } => {
            let name = modules::sealed_images::JOB_NAME;
            let options = SealedImageOptions { set_id: set };
            let outcome = modules::collect_sealed_images(ctx, options, METHOD)
                .instrument(job_span!(name))
                .await?;
            (name, outcome)
        }
        CollectJob::CurrencyRates => {
            let name = modules::currency_rates::JOB_NAME;
            let outcome = modules::collect_currency_rates(ctx, METHOD)
                .instrument(job_span!(name))
                .await?;
            (name, outcome)
        }
        CollectJob::PortfolioValues => {
            let name = modules::portfolio_values::JOB_NAME;
            let outcome = modules::collect_portfolio_values(ctx, METHOD)
                .instrument(job_span!(name))
                .await?;
            (name, outcome)
        }
    };

    Ok(print_outcome(name, &outcome))
}

async fn run_analyze(ctx: &CollectorContext, target: AnalysisTarget) -> bool {
    let mut ok = true;
    for kind in target.kinds() {
        let result = modules::run_analysis(&ctx.pool, kind, METHOD)
            .instrument(job_span!(kind.job_name()))
            .await;
        match result {
            Ok(outcome) => ok &= print_outcome(kind.job_name(), &outcome),
            Err(e) => {
                tracing::error!(kind = %kind, error = %e, "분석 실행 실패");
                ok = false;
            }
        }
    }
    ok
}

async fn run_tracking(
    ctx: &CollectorContext,
    target: AnalysisTarget,
) -> folio_collector::Result<bool> {
    for kind in target.kinds() {
        let records = modules::list_tracking(&ctx.pool, kind).await?;
        println!("== {} ({} partitions) ==", kind, records.len());
        for record in records {
            println!(
                "{:<16} {:<12} {:>8} {:<25} {}",
                record.partition_key,
                record.status.as_str(),
                record.record_count,
                record
                    .processed_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string()),
                record.error_message.as_deref().unwrap_or("")
            );
        }
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // 로깅 초기화
    let level = format!("folio_collector={0},folio_core={0}", cli.log_level);
    init_logging(LogConfig::new(level).with_env_format())?;

    tracing::info!("Pokefolio Collector 시작");

    // 설정 로드
    let config = CollectorConfig::from_env()?;
    tracing::debug!(card_api = %config.api.card_api_base_url, "설정 로드 완료");

    let ctx = Arc::new(CollectorContext::connect(config).await?);

    // 명령 실행
    let ok = match cli.command {
        Commands::Collect { job } => run_collect(&ctx, job).await?,
        Commands::Analyze { kind } => run_analyze(&ctx, kind).await,
        Commands::Tracking { kind } => run_tracking(&ctx, kind).await?,
        Commands::Daemon => {
            scheduler::run_daemon(Arc::clone(&ctx)).await?;
            true
        }
    };

    ctx.pool.close().await;
    tracing::info!("Pokefolio Collector 종료");

    if !ok {
        std::process::exit(1);
    }

    Ok(())
}
