//! Static root-cause templates used when text generation is unavailable

use crate::models::Category;

pub(crate) struct Template {
    pub root_cause: &'static str,
    pub remediation_steps: &'static [&'static str],
}

static CRASH_LOOP: Template = Template {
    root_cause: "The container exits shortly after starting and is being restarted \
                 repeatedly. This usually points to an application error during startup, \
                 a missing configuration value or secret, or a failing dependency.",
    remediation_steps: &[
        "Inspect the previous container logs: kubectl logs <pod> -c <container> --previous",
        "Verify environment variables, ConfigMaps and Secrets referenced by the pod",
        "Check that dependent services (databases, queues, APIs) are reachable",
        "Review liveness probe thresholds for slow-starting containers",
    ],
};

static OUT_OF_MEMORY: Template = Template {
    root_cause: "The container exceeded its memory limit and was killed by the kernel \
                 (OOMKilled). The workload either needs more memory than it is allowed \
                 or is leaking memory over time.",
    remediation_steps: &[
        "Compare actual usage with the limit: kubectl top pod <pod> --containers",
        "Raise the container memory limit if the usage is legitimate",
        "Profile the application for memory leaks or unbounded caches",
        "Check runtime heap settings (JVM -Xmx, Node --max-old-space-size) against the limit",
    ],
};

static HIGH_CPU: Template = Template {
    root_cause: "The pod is saturating its CPU allocation. Sustained throttling slows \
                 request handling and can cause probe failures and restarts.",
    remediation_steps: &[
        "Check CPU usage and throttling: kubectl top pod <pod> --containers",
        "Raise the CPU request or limit, or scale out with a HorizontalPodAutoscaler",
        "Profile hot code paths and look for busy loops",
    ],
};

static POD_FAILURE: Template = Template {
    root_cause: "The pod terminated unsuccessfully. The container could not run or \
                 exceeded its active deadline.",
    remediation_steps: &[
        "Describe the pod for termination details: kubectl describe pod <pod>",
        "Check that the image exists and the entrypoint is valid",
        "Review activeDeadlineSeconds and job backoff limits",
        "Inspect container logs: kubectl logs <pod> --all-containers",
    ],
};

static NODE_ISSUE: Template = Template {
    root_cause: "The pod was evicted or lost contact with its node. The node may be \
                 under resource pressure, unreachable or being drained.",
    remediation_steps: &[
        "Check node conditions: kubectl describe node <node>",
        "Look for memory, disk or PID pressure on the node",
        "Verify the kubelet is running and the node is Ready",
        "Add a PodDisruptionBudget and spread replicas across nodes",
    ],
};

static SCHEDULING_ISSUE: Template = Template {
    root_cause: "The scheduler could not place the pod on any node. Resource requests \
                 may exceed available capacity or node selectors, taints and affinity \
                 rules may exclude every node.",
    remediation_steps: &[
        "Read the scheduling events: kubectl describe pod <pod>",
        "Compare requests with allocatable capacity: kubectl describe nodes",
        "Review nodeSelector, affinity rules and tolerations",
        "Scale the cluster or lower the resource requests",
    ],
};

static MANUAL_INVESTIGATION: Template = Template {
    root_cause: "The failure does not match a known pattern. Manual investigation required.",
    remediation_steps: &[
        "kubectl describe pod <pod> -n <namespace>",
        "kubectl logs <pod> -n <namespace> --all-containers --previous",
        "kubectl get events -n <namespace> --sort-by=.lastTimestamp",
    ],
};

/// Template for a category; unrecognized failures get the manual investigation template
pub(crate) fn template_for(category: Category) -> &'static Template {
    match category {
        Category::CrashLoopBackOff => &CRASH_LOOP,
        Category::OutOfMemory => &OUT_OF_MEMORY,
        Category::HighCpuUsage => &HIGH_CPU,
        Category::PodFailure => &POD_FAILURE,
        Category::NodeIssue => &NODE_ISSUE,
        Category::SchedulingIssue => &SCHEDULING_ISSUE,
        Category::Unknown => &MANUAL_INVESTIGATION,
    }
}
