mod config;
mod genesis;
mod logging;

use std::sync::{Arc, RwLock};

use chain_engine::backend::RocksBackend;
use chain_engine::controller::{Controller, ControllerConfig};
use chain_engine::externs::{EmptyBlockStore, NullMessageBus, PermissiveMempool};
use chain_engine::fork_db::ForkDb;
use chain_engine::host::{HostDispatcher, NullVm};
use chain_engine::indexer::Indexer;
use chain_engine::node::StateNode;
use chain_engine::thunks::{builtin, ThunkDispatcher};

use config::NodeConfig;

/// Wires together a [`RocksBackend`]-backed [`ForkDb`], the thunk
/// dispatcher, and the out-of-scope collaborators (section 1: AMQP
/// transport, WASM backend, block store, mempool) into a [`Controller`],
/// installing genesis if the state directory is empty.
fn build_controller(config: &NodeConfig) -> anyhow::Result<Controller<RocksBackend>> {
    std::fs::create_dir_all(&config.statedir)?;
    let backend = Arc::new(RwLock::new(RocksBackend::open(&config.statedir)?));

    let genesis_path = config.genesis_data.clone();
    let installer = |root: &Arc<StateNode<RocksBackend>>| -> anyhow::Result<()> {
        let path = genesis_path
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("--genesis-data is required to open an empty state directory"))?;
        let bundle = genesis::load_bundle(path)?;
        genesis::install(root, &bundle)
    };

    let fork_db = ForkDb::open(backend, installer, config.fork_algorithm.comparator())?;
    if config.reset {
        log::warn!("--reset: wiping {} and reinstalling genesis", config.statedir.display());
        let genesis_path = config.genesis_data.clone();
        let installer = |root: &Arc<StateNode<RocksBackend>>| -> anyhow::Result<()> {
            let path = genesis_path.as_ref().ok_or_else(|| {
                anyhow::anyhow!("--genesis-data is required to open an empty state directory")
            })?;
            let bundle = genesis::load_bundle(path)?;
            genesis::install(root, &bundle)
        };
        fork_db.reset(installer)?;
    }

    let dispatcher: ThunkDispatcher<RocksBackend> = ThunkDispatcher::new();
    builtin::register_all(&dispatcher);
    // No WASM runtime is linked into this binary (section 1 non-goal); contract
    // calls fail with a system error until an embedding supplies a real VM.
    let host = HostDispatcher::new(dispatcher, Box::new(NullVm));

    if config.amqp.is_some() {
        log::warn!("--amqp is set but no message-bus client is linked into this binary; publishes/subscribes are local-only");
    }

    Ok(Controller::new(
        fork_db,
        host,
        Box::new(EmptyBlockStore),
        Box::new(PermissiveMempool),
        Box::new(NullMessageBus),
        ControllerConfig {
            read_compute_bandwidth_limit: config.read_compute_bandwidth_limit,
            ..ControllerConfig::default()
        },
    ))
}

/// Catches the local head up to the block store's highest known block
/// before serving live traffic (section 4.J).
fn run_indexer(controller: &Controller<RocksBackend>, now: u64) -> anyhow::Result<()> {
    let target = controller.block_store().get_highest_block()?;
    let head = controller.get_head_info()?.height;
    if target > head {
        log::info!("catching up from height {head} to {target} before serving requests");
        Indexer::new(controller).sync_to(target, now)?;
    }
    Ok(())
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn run() -> anyhow::Result<()> {
    let config = NodeConfig::load()?;
    logging::init(&config)?;

    log::info!(
        "starting {} (statedir={}, fork-algorithm={:?}, jobs={})",
        config.instance_id,
        config.statedir.display(),
        config.fork_algorithm,
        config.jobs
    );

    let controller = build_controller(&config)?;
    log::info!(
        "opened state at height {}, chain id {:?}",
        controller.get_head_info().map(|h| h.height).unwrap_or(0),
        controller.get_chain_id()?
    );

    run_indexer(&controller, now_unix())?;

    // The RPC surface (section 4.K) is driven over an AMQP transport that
    // is out of scope for this crate (section 1); with no broker client
    // linked in, the node's remaining job is to hold its state open and
    // serve nothing until asked to shut down.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.jobs)
        .enable_all()
        .build()?;
    runtime.block_on(async {
        log::info!("node ready; waiting for shutdown signal");
        tokio::signal::ctrl_c().await
    })?;

    log::info!("shutdown signal received, flushing state and exiting");
    controller.fork_db().close()?;
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        log::error!("fatal: {e:#}");
        eprintln!("fatal: {e:#}");
        std::process::exit(1);
    }
}
