//! Property tests: a pipeline re-opened from disk matches the one in memory.

use camino::Utf8PathBuf;
use pipewright_builtin::builtin_repository;
use pipewright_catalog::RepositoryRegistry;
use pipewright_core::adapters::{
    InMemoryCurrentPipeline, RecordingEngine, RecordingExec, StaticEnvironments,
};
use pipewright_core::{Pipeline, Runtime};
use pipewright_types::{EnvMap, Layout};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

fn runtime(root: Utf8PathBuf) -> Runtime {
    let registry = RepositoryRegistry::new().with_builtin(Box::new(builtin_repository()));
    Runtime::new(Layout::under(root), registry)
        .with_exec(Arc::new(RecordingExec::new()))
        .with_engines(Box::new(RecordingEngine::new()))
        .with_environments(Box::new(StaticEnvironments::new(EnvMap::new())))
        .with_current(Box::new(InMemoryCurrentPipeline::default()))
}

fn members() -> impl Strategy<Value = Vec<(String, i64, bool)>> {
    prop::collection::btree_set("[a-z][a-z0-9_]{0,8}", 0..6).prop_flat_map(|aliases| {
        let aliases: Vec<String> = aliases.into_iter().collect();
        let n = aliases.len();
        (
            Just(aliases),
            prop::collection::vec(1i64..512, n),
            prop::collection::vec(any::<bool>(), n),
        )
            .prop_map(|(aliases, nprocs, reads)| {
                aliases
                    .into_iter()
                    .zip(nprocs)
                    .zip(reads)
                    .map(|((a, n), r)| (a, n, r))
                    .collect()
            })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn appended_pipeline_survives_reopen(members in members(), vars in prop::collection::btree_map("[A-Z_]{1,8}", "[a-z/:]{0,12}", 0..5)) {
        let tmp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let rt = runtime(root);

        let mut p = Pipeline::create(&rt, "prop").unwrap();
        for (alias, nprocs, read) in &members {
            let overrides = vec![format!("nprocs={}", nprocs), format!("read={}", read)];
            p.append("ior", Some(alias), &overrides).unwrap();
        }
        let env: EnvMap = vars.into_iter().collect();
        rt.environments.save("vars", &env).unwrap();
        p.env_copy("vars").unwrap();

        let reopened = Pipeline::open(&rt, "prop").unwrap();
        prop_assert_eq!(&reopened.state().packages, &p.state().packages);
        prop_assert_eq!(&reopened.state().env, &p.state().env);
        prop_assert_eq!(reopened.state().created_at, p.state().created_at);

        let ids: BTreeSet<String> = reopened.state().package_ids().into_iter().collect();
        prop_assert_eq!(ids.len(), members.len());
    }
}
